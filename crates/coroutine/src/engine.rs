use std::cell::RefCell;
use std::rc::Rc;

use crate::arch::{self, Registers};
use crate::tls;

const DEFAULT_STACK_SIZE: usize = 256 * 1024;

fn default_stack_size() -> usize {
    rt_core::env_get("RT_COROUTINE_STACK_SIZE", DEFAULT_STACK_SIZE)
}

/// A stable handle to a spawned routine. Indices are reused once a
/// routine is reclaimed; the generation counter distinguishes a handle
/// from a stale one pointing at a slot that has since been recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoutineId {
    index: usize,
    generation: u32,
}

struct Routine {
    generation: u32,
    regs: Registers,
    // Kept alive only so its backing allocation outlives every pointer
    // `regs.rsp` may reference; never read directly.
    _stack: Box<[u8]>,
    caller: Option<RoutineId>,
    callee: Option<RoutineId>,
    prev: Option<RoutineId>,
    next: Option<RoutineId>,
}

enum Slot {
    Vacant { next_free: Option<usize>, generation: u32 },
    Occupied(Box<Routine>),
}

struct Inner {
    root: Registers,
    slots: Vec<Slot>,
    free_head: Option<usize>,
    alive_head: Option<RoutineId>,
    current: Option<RoutineId>,
    // A routine whose body has finished but whose stack can't be freed
    // until we're executing on a *different* stack. Reclaimed on the
    // next completion, or when the engine itself drops.
    pending_free: Option<RoutineId>,
}

impl Inner {
    fn get(&self, id: RoutineId) -> &Routine {
        match &self.slots[id.index] {
            Slot::Occupied(r) if r.generation == id.generation => r,
            _ => panic!("coroutine: stale or invalid RoutineId {id:?}"),
        }
    }

    fn get_mut(&mut self, id: RoutineId) -> &mut Routine {
        match &mut self.slots[id.index] {
            Slot::Occupied(r) if r.generation == id.generation => r,
            _ => panic!("coroutine: stale or invalid RoutineId {id:?}"),
        }
    }

    fn alloc_slot(&mut self, make: impl FnOnce(u32) -> Routine) -> RoutineId {
        if let Some(idx) = self.free_head {
            let generation = match self.slots[idx] {
                Slot::Vacant { next_free, generation } => {
                    self.free_head = next_free;
                    generation.wrapping_add(1)
                }
                Slot::Occupied(_) => unreachable!("free list pointed at an occupied slot"),
            };
            self.slots[idx] = Slot::Occupied(Box::new(make(generation)));
            RoutineId { index: idx, generation }
        } else {
            let generation = 0;
            self.slots.push(Slot::Occupied(Box::new(make(generation))));
            RoutineId { index: self.slots.len() - 1, generation }
        }
    }

    fn free_slot(&mut self, id: RoutineId) {
        let generation = self.get(id).generation;
        self.slots[id.index] = Slot::Vacant { next_free: self.free_head, generation };
        self.free_head = Some(id.index);
    }

    fn unlink_alive(&mut self, id: RoutineId) {
        let (prev, next) = {
            let r = self.get(id);
            (r.prev, r.next)
        };
        match prev {
            Some(p) => self.get_mut(p).next = next,
            None => self.alive_head = next,
        }
        if let Some(n) = next {
            self.get_mut(n).prev = prev;
        }
    }

    fn push_alive_front(&mut self, id: RoutineId) {
        let old_head = self.alive_head;
        if let Some(h) = old_head {
            self.get_mut(h).prev = Some(id);
        }
        {
            let r = self.get_mut(id);
            r.prev = None;
            r.next = old_head;
        }
        self.alive_head = Some(id);
    }

    fn any_other_alive(&self, exclude: RoutineId) -> Option<RoutineId> {
        let mut cur = self.alive_head;
        while let Some(id) = cur {
            if id != exclude {
                return Some(id);
            }
            cur = self.get(id).next;
        }
        None
    }

    /// Whether `id` is still linked in the alive list. A routine that has
    /// finished is unlinked immediately (see `routine_finished`) even
    /// though its slot may briefly still be `Occupied` while reclamation
    /// is deferred — `caller`/`callee` links pointing at it must not be
    /// treated as live targets.
    fn is_alive(&self, id: RoutineId) -> bool {
        let mut cur = self.alive_head;
        while let Some(cur_id) = cur {
            if cur_id == id {
                return true;
            }
            cur = self.get(cur_id).next;
        }
        false
    }

    fn regs_ptr_mut(&mut self, id: Option<RoutineId>) -> *mut Registers {
        match id {
            Some(id) => &mut self.get_mut(id).regs as *mut Registers,
            None => &mut self.root as *mut Registers,
        }
    }

    fn regs_ptr_const(&mut self, id: Option<RoutineId>) -> *const Registers {
        self.regs_ptr_mut(id) as *const Registers
    }
}

/// A cooperative, single-OS-thread scheduler of stackful routines.
///
/// Cheap to clone: an [`Engine`] is a handle around a reference-counted,
/// interior-mutable arena, so routine closures can capture their own
/// engine and call back into it without an explicit parameter threaded
/// through every call site. Not [`Send`] or [`Sync`] — every routine and
/// the engine that schedules them live on one OS thread for their entire
/// lifetime.
#[derive(Clone)]
pub struct Engine(Rc<RefCell<Inner>>);

impl Engine {
    /// Construct an engine with no routines. Nothing runs until
    /// [`spawn`](Engine::spawn) and a subsequent [`sched`](Engine::sched)
    /// or [`yield_now`](Engine::yield_now) are called from the owning
    /// thread.
    pub fn new() -> Engine {
        Engine(Rc::new(RefCell::new(Inner {
            root: Registers::default(),
            slots: Vec::new(),
            free_head: None,
            alive_head: None,
            current: None,
            pending_free: None,
        })))
    }

    /// Queue `entry` as a new alive routine with the default stack size
    /// (overridable via `RT_COROUTINE_STACK_SIZE`). Does not run it —
    /// only [`sched`](Engine::sched)/[`yield_now`](Engine::yield_now)
    /// transfer control.
    pub fn spawn(&self, entry: impl FnOnce() + 'static) -> RoutineId {
        self.spawn_with_stack_size(entry, default_stack_size())
    }

    /// Like [`spawn`](Engine::spawn) with an explicit stack size in bytes.
    pub fn spawn_with_stack_size(&self, entry: impl FnOnce() + 'static, stack_size: usize) -> RoutineId {
        let boxed: Box<dyn FnOnce()> = Box::new(entry);
        let arg = Box::into_raw(Box::new(boxed)) as usize;

        let mut stack = vec![0u8; stack_size].into_boxed_slice();
        let stack_top = unsafe { stack.as_mut_ptr().add(stack.len()) };

        let mut inner = self.0.borrow_mut();
        let id = inner.alloc_slot(|generation| {
            let mut regs = Registers::default();
            unsafe { arch::prepare(&mut regs, stack_top, call_closure as usize, arg) };
            Routine {
                generation,
                regs,
                _stack: stack,
                caller: None,
                callee: None,
                prev: None,
                next: None,
            }
        });
        inner.push_alive_front(id);
        drop(inner);
        rt_core::rtlog_trace!("coroutine", "spawned {id:?}");
        id
    }

    /// `true` iff `id` refers to a routine that has not yet finished.
    pub fn is_alive(&self, id: RoutineId) -> bool {
        matches!(self.0.borrow().slots.get(id.index), Some(Slot::Occupied(r)) if r.generation == id.generation)
    }

    /// Number of routines that have not yet finished.
    pub fn alive_count(&self) -> usize {
        let inner = self.0.borrow();
        let mut count = 0;
        let mut cur = inner.alive_head;
        while let Some(id) = cur {
            count += 1;
            cur = inner.get(id).next;
        }
        count
    }

    /// Yield control: equivalent to `sched(None)`.
    pub fn yield_now(&self) {
        self.sched(None);
    }

    /// Transfer control to `target`, or resolve one per the policy below
    /// when `target` is `None`:
    ///
    /// - No routine is current: switch to the head of the alive list, or
    ///   do nothing if none are alive.
    /// - A routine is current: switch to its caller if it has one,
    ///   otherwise to any other alive routine, otherwise it's a no-op.
    ///
    /// If the resolved (or explicit) target is already current, this is
    /// always a no-op — even before the nested-call bookkeeping below.
    ///
    /// Before switching, if the target's `callee` points back at the
    /// current routine, that back-link is cleared (the nested call is
    /// returning). The target is then unwound to its innermost callee
    /// before the switch actually happens, and the target records the
    /// outgoing routine as its new caller.
    ///
    /// # Panics
    ///
    /// Panics if `target` names a routine that has already finished.
    pub fn sched(&self, target: Option<RoutineId>) {
        let (from_ptr, to_ptr) = {
            let mut inner = self.0.borrow_mut();
            let current = inner.current;

            let mut target = match (target, current) {
                (Some(t), _) => t,
                (None, None) => match inner.alive_head {
                    Some(head) => head,
                    None => return,
                },
                // A recorded `caller` can itself have finished (and been
                // unlinked, or even reclaimed) while this routine was
                // suspended — e.g. it was woken by some other routine's
                // fallback instead of by its recorded caller. Only ever
                // resolve to a target still in the alive list.
                (None, Some(cur)) => match inner.get(cur).caller {
                    Some(caller) if inner.is_alive(caller) => caller,
                    _ => match inner.any_other_alive(cur) {
                        Some(other) => other,
                        None => cur,
                    },
                },
            };

            if Some(target) == current {
                return;
            }

            if let Some(cur) = current {
                if inner.get(target).callee == Some(cur) {
                    inner.get_mut(target).callee = None;
                    inner.get_mut(cur).caller = None;
                }
            }

            while let Some(callee) = inner.get(target).callee {
                target = callee;
            }

            inner.get_mut(target).caller = current;
            inner.current = Some(target);
            tls::set_current_engine(Rc::as_ptr(&self.0) as *const ());

            let from_ptr = inner.regs_ptr_mut(current);
            let to_ptr = inner.regs_ptr_const(Some(target));
            (from_ptr, to_ptr)
        };
        // `inner`'s borrow is dropped above: `switch` may resume on a
        // completely different call stack, possibly much later, and
        // must never find this RefCell still borrowed.
        unsafe { arch::switch(from_ptr, to_ptr) };
    }
}

impl Default for Engine {
    fn default() -> Engine {
        Engine::new()
    }
}

extern "C" fn call_closure(arg: usize) {
    let boxed: Box<Box<dyn FnOnce()>> = unsafe { Box::from_raw(arg as *mut Box<dyn FnOnce()>) };
    (*boxed)();
}

/// Invoked by the architecture trampoline once a routine's entry closure
/// returns. Implements the completion primitive: the finished routine is
/// dropped from the alive list and control passes to its caller, or
/// absent one, to any other alive routine, or to the root if none
/// remain. Never returns.
pub(crate) extern "C" fn routine_finished() -> ! {
    let engine_ptr = tls::current_engine();
    assert!(!engine_ptr.is_null(), "coroutine: routine finished with no engine recorded");
    let inner = unsafe { &*(engine_ptr as *const RefCell<Inner>) };

    let to_ptr = {
        let mut inner = inner.borrow_mut();
        let finished = inner.current.expect("coroutine: a routine must be current to finish");

        inner.unlink_alive(finished);

        // The caller may itself have already finished and be sitting in
        // `pending_free` (or, transiently, have been freed outright) —
        // its slot being `Occupied` doesn't mean it's still a valid
        // switch target. Only ever transfer to a routine still linked in
        // the alive list.
        let target = match inner.get(finished).caller {
            Some(caller) if inner.is_alive(caller) => Some(caller),
            _ => inner.any_other_alive(finished),
        };

        if let Some(t) = target {
            if inner.get(t).callee == Some(finished) {
                inner.get_mut(t).callee = None;
            }
        }

        if let Some(zombie) = inner.pending_free.take() {
            inner.free_slot(zombie);
        }
        inner.pending_free = Some(finished);
        inner.current = target;

        rt_core::rtlog_trace!("coroutine", "{finished:?} finished, transferring to {target:?}");
        inner.regs_ptr_const(target)
    };

    unsafe {
        // Save side is never read again: this stack is being torn down.
        let mut discard = Registers::default();
        arch::switch(&mut discard, to_ptr);
    }
    unreachable!("coroutine: switched away from a finished routine");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc as StdRc;

    #[test]
    fn single_routine_runs_to_completion() {
        let engine = Engine::new();
        let ran = StdRc::new(StdRefCell::new(false));
        let ran2 = StdRc::clone(&ran);
        engine.spawn(move || {
            *ran2.borrow_mut() = true;
        });
        engine.yield_now();
        assert!(*ran.borrow());
        assert_eq!(engine.alive_count(), 0);
    }

    #[test]
    fn lone_routine_self_yield_is_a_noop() {
        // With only one alive routine, its `yield_now()` resolves to no
        // caller and no other alive routine, so `sched` falls back to the
        // routine itself and returns immediately without switching away
        // (§4.2 step 2, third tier). The routine therefore runs straight
        // through to completion, and the root's own `yield_now()` below
        // doesn't regain control until after that happens.
        let engine = Engine::new();
        let trace = StdRc::new(StdRefCell::new(Vec::new()));
        let trace2 = StdRc::clone(&trace);
        let inner_engine = engine.clone();
        engine.spawn(move || {
            trace2.borrow_mut().push(1);
            inner_engine.yield_now();
            trace2.borrow_mut().push(3);
        });

        engine.yield_now();
        trace.borrow_mut().push(2);
        engine.yield_now();

        assert_eq!(*trace.borrow(), vec![1, 3, 2]);
        assert_eq!(engine.alive_count(), 0);
    }

    #[test]
    fn two_routines_interleave_via_explicit_sched() {
        let engine = Engine::new();
        let trace = StdRc::new(StdRefCell::new(Vec::new()));

        let e1 = engine.clone();
        let t1 = StdRc::clone(&trace);
        let r2_slot: StdRc<StdRefCell<Option<RoutineId>>> = StdRc::new(StdRefCell::new(None));
        let r2_slot_1 = StdRc::clone(&r2_slot);
        let r1 = engine.spawn(move || {
            for i in 0..3 {
                t1.borrow_mut().push(('a', i));
                let target = *r2_slot_1.borrow();
                e1.sched(target);
            }
        });

        let e2 = engine.clone();
        let t2 = StdRc::clone(&trace);
        let r2 = engine.spawn(move || {
            for i in 0..3 {
                t2.borrow_mut().push(('b', i));
                e2.yield_now();
            }
        });
        *r2_slot.borrow_mut() = Some(r2);

        while engine.is_alive(r1) || engine.is_alive(r2) {
            engine.yield_now();
        }

        assert_eq!(trace.borrow().len(), 6);
        assert_eq!(engine.alive_count(), 0);
    }

    #[test]
    fn sched_to_self_is_a_no_op() {
        let engine = Engine::new();
        let trace = StdRc::new(StdRefCell::new(Vec::new()));
        let trace2 = StdRc::clone(&trace);
        let e1 = engine.clone();
        let self_id_cell: StdRc<StdRefCell<Option<RoutineId>>> = StdRc::new(StdRefCell::new(None));
        let self_id_cell2 = StdRc::clone(&self_id_cell);
        let id = engine.spawn(move || {
            trace2.borrow_mut().push("start");
            let me = *self_id_cell2.borrow();
            if let Some(me) = me {
                e1.sched(Some(me));
            }
            trace2.borrow_mut().push("end");
        });
        *self_id_cell.borrow_mut() = Some(id);

        engine.yield_now();
        assert_eq!(*trace.borrow(), vec!["start", "end"]);
    }
}
