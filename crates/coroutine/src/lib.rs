//! # coroutine
//!
//! A cooperative, single-OS-thread scheduler of stackful routines. Every
//! [`Engine`] owns an arena of routines, each running on its own
//! dedicated stack; switching between them is a register-context swap
//! rather than a copy of stack contents, via the backend in [`arch`].
//!
//! There is no preemption and no cross-thread scheduling: an [`Engine`]
//! and every routine it drives must stay on the thread that created them
//! for their entire lifetime.

mod arch;
mod engine;
mod tls;

pub use engine::{Engine, RoutineId};
