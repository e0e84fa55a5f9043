//! Architecture-specific context switching.
//!
//! Each backend saves/restores the callee-saved register set (System V
//! or AAPCS64, depending on target) plus the stack pointer and return
//! address. This is the "platform context-switch facility" the coroutine
//! engine's design explicitly allows in place of copying stack bytes
//! around: every routine gets its own dedicated, heap-allocated stack,
//! and a context switch is just a register swap.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        pub use x86_64::*;
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use aarch64::*;
    } else {
        compile_error!("coroutine: no context-switch backend for this architecture");
    }
}
