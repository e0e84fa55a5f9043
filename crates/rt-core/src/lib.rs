//! # rt-core
//!
//! Shared, platform-agnostic plumbing for the worker-pool, coroutine, and
//! lru-cache crates: environment-variable configuration helpers and a
//! zero-dependency logging facility.
//!
//! Nothing in here is specific to any one of the three primitives; each
//! of them depends on `rt-core` the way `gvthread-runtime` depends on
//! `gvthread-core`.

pub mod env;
pub mod log;

pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};
pub use log::LogLevel;
