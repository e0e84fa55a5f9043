//! Thread-local pointer back to whichever engine is currently running a
//! routine on this OS thread. Set by [`crate::Engine::sched`] right
//! before every switch into a routine; read by [`crate::routine_finished`],
//! which has no other way to recover its engine since the trampoline
//! calls it with no arguments.

use std::cell::Cell;

thread_local! {
    static CURRENT_ENGINE: Cell<*const ()> = const { Cell::new(std::ptr::null()) };
}

#[inline]
pub(crate) fn set_current_engine(inner: *const ()) {
    CURRENT_ENGINE.with(|cell| cell.set(inner));
}

#[inline]
pub(crate) fn current_engine() -> *const () {
    CURRENT_ENGINE.with(|cell| cell.get())
}
