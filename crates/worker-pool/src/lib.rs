//! # worker-pool
//!
//! A bounded, elastic thread pool that multiplexes short, opaque work
//! items over `low_watermark..=high_watermark` worker threads, growing on
//! demand and shrinking back down after `idle_timeout` of no work.
//!
//! Everything shared between workers — the task queue, the pool state,
//! and the thread counters — lives under a single [`Mutex`]; two
//! [`Condvar`]s coordinate waiting workers (`not_empty`) and callers of
//! [`WorkerPool::stop`] with `await_drain = true` (`all_stopped`).
//!
//! A task that panics terminates the process: tasks are expected to
//! handle their own errors, and the pool has no retry or recovery path.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// An opaque, nullary, side-effecting unit of work submitted to the pool.
type Task = Box<dyn FnOnce() + Send + 'static>;

/// Outcome of a call to [`WorkerPool::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The task was enqueued (and will run exactly once).
    Accepted,
    /// The pool could not take the task; the caller's state is unchanged.
    Rejected,
}

impl Submission {
    pub fn is_accepted(self) -> bool {
        matches!(self, Submission::Accepted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Stopping,
    Stopped,
}

struct Inner {
    queue: VecDeque<Task>,
    state: State,
    num_threads: usize,
    num_idle: usize,
}

struct Shared {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    all_stopped: Condvar,
    low_watermark: usize,
    high_watermark: usize,
    max_queue_size: usize,
    idle_timeout: Duration,
}

/// A dynamic pool of worker threads executing submitted [`Task`]s.
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Construct a pool in the Running state and spawn `low_watermark`
    /// worker threads immediately.
    ///
    /// # Panics
    ///
    /// Panics if `low_watermark > high_watermark` or `idle_timeout` is
    /// zero — both are construction-time configuration errors, not
    /// runtime rejections, so they are not routed through [`Submission`].
    pub fn new(
        low_watermark: usize,
        high_watermark: usize,
        max_queue_size: usize,
        idle_timeout: Duration,
    ) -> WorkerPool {
        assert!(
            low_watermark <= high_watermark,
            "low_watermark ({low_watermark}) must be <= high_watermark ({high_watermark})"
        );
        assert!(!idle_timeout.is_zero(), "idle_timeout must be > 0");

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                state: State::Running,
                num_threads: 0,
                num_idle: 0,
            }),
            not_empty: Condvar::new(),
            all_stopped: Condvar::new(),
            low_watermark,
            high_watermark,
            max_queue_size,
            idle_timeout,
        });

        {
            let mut inner = shared.inner.lock().unwrap();
            inner.num_threads = low_watermark;
            inner.num_idle = low_watermark;
        }
        for _ in 0..low_watermark {
            spawn_worker(&shared);
        }

        rt_core::rtlog_debug!("pool", "started with {low_watermark} initial worker(s)");
        WorkerPool { shared }
    }

    /// Try to schedule `task`. Never blocks on the task's execution.
    ///
    /// Accepted iff, at the moment of submission, the pool is Running,
    /// the queue has room (`queue_len < max_queue_size`), and either an
    /// idle worker exists or the pool can still grow. The task is only
    /// enqueued once the accept decision is certain, so a rejection never
    /// leaves an orphaned queue entry (see the acceptance-path ordering
    /// note this pool's design is built around).
    pub fn execute<F>(&self, task: F) -> Submission
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = self.shared.inner.lock().unwrap();

        if inner.state != State::Running {
            return Submission::Rejected;
        }
        if inner.queue.len() >= self.shared.max_queue_size {
            return Submission::Rejected;
        }

        if inner.num_idle > 0 {
            inner.queue.push_back(Box::new(task));
            self.shared.not_empty.notify_one();
            return Submission::Accepted;
        }

        if inner.num_threads < self.shared.high_watermark {
            inner.queue.push_back(Box::new(task));
            inner.num_threads += 1;
            inner.num_idle += 1;
            let num_threads = inner.num_threads;
            drop(inner);
            spawn_worker(&self.shared);
            rt_core::rtlog_debug!("pool", "grew to {num_threads} worker(s)");
            return Submission::Accepted;
        }

        Submission::Rejected
    }

    /// Transition Running → Stopping. No further submissions are
    /// accepted; queued tasks still run. If `await_drain`, blocks until
    /// every worker has exited (state is Stopped).
    pub fn stop(&self, await_drain: bool) {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.state == State::Running {
            inner.state = State::Stopping;
            if inner.num_threads == 0 {
                inner.state = State::Stopped;
                self.shared.all_stopped.notify_all();
            } else {
                self.shared.not_empty.notify_all();
            }
        }
        if await_drain {
            while inner.state != State::Stopped {
                inner = self.shared.all_stopped.wait(inner).unwrap();
            }
        }
    }

    /// Number of live workers right now (Running or draining).
    pub fn num_threads(&self) -> usize {
        self.shared.inner.lock().unwrap().num_threads
    }

    /// Number of workers currently blocked waiting for work.
    pub fn num_idle(&self) -> usize {
        self.shared.inner.lock().unwrap().num_idle
    }

    /// Number of tasks waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.shared.inner.lock().unwrap().queue.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop(true);
    }
}

fn spawn_worker(shared: &Arc<Shared>) {
    let shared = Arc::clone(shared);
    thread::Builder::new()
        .name("worker-pool-worker".into())
        .spawn(move || worker_loop(shared))
        .expect("failed to spawn worker-pool thread");
}

/// The loop every worker thread runs, per the exact semantics in §4.1:
/// wait for work (or idle-timeout shrink), drain on Stopping, otherwise
/// pop-execute-repeat without holding the mutex during execution.
fn worker_loop(shared: Arc<Shared>) {
    loop {
        let mut inner = shared.inner.lock().unwrap();
        let mut timed_out = false;

        while inner.queue.is_empty() && inner.state == State::Running {
            let (guard, timeout_result) = shared
                .not_empty
                .wait_timeout(inner, shared.idle_timeout)
                .unwrap();
            inner = guard;
            if timeout_result.timed_out() {
                timed_out = true;
                break;
            }
        }

        if inner.queue.is_empty() && inner.state == State::Stopping {
            break;
        }

        if timed_out {
            if inner.num_threads > shared.low_watermark {
                break;
            }
            continue;
        }

        let task = inner
            .queue
            .pop_front()
            .expect("queue is non-empty on this path");
        inner.num_idle -= 1;
        drop(inner);

        task();

        shared.inner.lock().unwrap().num_idle += 1;
    }

    let mut inner = shared.inner.lock().unwrap();
    inner.num_idle -= 1;
    inner.num_threads -= 1;
    let num_threads = inner.num_threads;
    if inner.num_threads == 0 && inner.state == State::Stopping {
        inner.state = State::Stopped;
        shared.all_stopped.notify_all();
        drop(inner);
        rt_core::rtlog_debug!("pool", "all workers drained, pool stopped");
    } else {
        drop(inner);
        rt_core::rtlog_debug!("pool", "worker exited, {num_threads} remaining");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;

    #[test]
    fn executes_all_accepted_tasks_exactly_once() {
        let pool = WorkerPool::new(1, 4, 100, Duration::from_millis(50));
        let counter = Arc::new(Mutex::new(0usize));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            let accepted = pool.execute(move || {
                *counter.lock().unwrap() += 1;
            });
            assert_eq!(accepted, Submission::Accepted);
        }
        pool.stop(true);
        assert_eq!(*counter.lock().unwrap(), 100);
        assert_eq!(pool.num_threads(), 0);
    }

    #[test]
    fn rejects_when_no_idle_worker_and_no_room_to_grow() {
        let pool = WorkerPool::new(0, 0, 0, Duration::from_millis(10));
        assert_eq!(pool.execute(|| {}), Submission::Rejected);
        pool.stop(true);
    }

    #[test]
    fn queue_bound_is_inclusive_ge_not_off_by_one() {
        let pool = WorkerPool::new(1, 1, 1, Duration::from_millis(50));
        let (tx, rx) = mpsc::channel::<()>();
        let rx = Mutex::new(rx);

        assert_eq!(
            pool.execute(move || {
                rx.lock().unwrap().recv().ok();
            }),
            Submission::Accepted
        );
        thread::sleep(Duration::from_millis(30));
        // single worker now busy: num_idle == 0, num_threads == high_watermark

        assert_eq!(pool.execute(|| {}), Submission::Accepted); // fills the one queue slot
        thread::sleep(Duration::from_millis(10));
        assert_eq!(pool.queue_len(), 1);

        assert_eq!(pool.execute(|| {}), Submission::Rejected); // queue_len(1) >= max_queue_size(1)

        tx.send(()).unwrap();
        pool.stop(true);
    }

    #[test]
    fn grows_on_demand_then_shrinks_to_low_watermark() {
        let pool = WorkerPool::new(1, 2, 8, Duration::from_millis(50));
        let (tx, rx) = mpsc::channel::<()>();
        let rx = Mutex::new(rx);

        assert!(pool
            .execute(move || {
                rx.lock().unwrap().recv().ok();
            })
            .is_accepted());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(pool.num_threads(), 1);
        assert_eq!(pool.num_idle(), 0);

        let done = Arc::new(AtomicBool::new(false));
        let done2 = Arc::clone(&done);
        assert!(pool.execute(move || done2.store(true, Ordering::SeqCst)).is_accepted());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(pool.num_threads(), 2);
        assert!(done.load(Ordering::SeqCst));

        tx.send(()).unwrap();
        // two idle-timeout windows to let the grown worker shrink back out
        thread::sleep(Duration::from_millis(250));
        assert_eq!(pool.num_threads(), 1);

        pool.stop(true);
        assert_eq!(pool.num_threads(), 0);
    }

    #[test]
    fn stop_without_await_returns_before_drain_completes() {
        let pool = WorkerPool::new(1, 1, 4, Duration::from_millis(20));
        let (tx, rx) = mpsc::channel::<()>();
        let rx = Mutex::new(rx);
        pool.execute(move || {
            rx.lock().unwrap().recv().ok();
        });
        thread::sleep(Duration::from_millis(10));
        pool.stop(false); // must return immediately, not wait for the blocked task
        tx.send(()).unwrap();
        pool.stop(true); // now actually wait for drain
        assert_eq!(pool.num_threads(), 0);
    }
}
