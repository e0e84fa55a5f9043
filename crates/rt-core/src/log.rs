//! Kernel-style print macros, trimmed down for the three core primitives.
//!
//! Unlike the gvthread scheduler this crate grew out of, none of these
//! primitives has a worker/routine ID worth stamping on every line, so the
//! prefix here is just the subsystem name the caller passes in.
//!
//! # Environment variables
//!
//! - `RT_LOG_LEVEL` — `off`/`error`/`warn`/`info`/`debug`/`trace` (or 0-5).
//!   Defaults to `info`.
//! - `RT_LOG_TIME=1` — prefix each line with nanoseconds since first use.
//! - `RT_LOG_FLUSH=1` — flush stderr after every line (useful when chasing
//!   a crash).

use crate::env::{env_get_bool, env_is_set};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static TIME_ENABLED: AtomicBool = AtomicBool::new(false);
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static START_TIME: OnceLock<Instant> = OnceLock::new();

fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    START_TIME.get_or_init(Instant::now);
    TIME_ENABLED.store(env_get_bool("RT_LOG_TIME", false), Ordering::Relaxed);
    FLUSH_ENABLED.store(env_get_bool("RT_LOG_FLUSH", false), Ordering::Relaxed);
    if env_is_set("RT_LOG_LEVEL") {
        let val = std::env::var("RT_LOG_LEVEL").unwrap_or_default();
        let level = match val.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => LogLevel::Info,
        };
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

/// Not part of the public contract of any of the three primitives — called
/// by the `rtlog_*!` macros only.
#[doc(hidden)]
pub fn emit(level: LogLevel, subsystem: &str, args: std::fmt::Arguments) {
    if !level_enabled(level) {
        return;
    }
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    let mut out = std::io::stderr();
    if TIME_ENABLED.load(Ordering::Relaxed) {
        let ns = START_TIME.get_or_init(Instant::now).elapsed().as_nanos();
        let _ = writeln!(out, "{} [{ns:>12}] [{subsystem}] {args}", level.prefix());
    } else {
        let _ = writeln!(out, "{} [{subsystem}] {args}", level.prefix());
    }
    if FLUSH_ENABLED.load(Ordering::Relaxed) {
        let _ = out.flush();
    }
}

#[macro_export]
macro_rules! rtlog_error {
    ($subsystem:expr, $($arg:tt)*) => {
        $crate::log::emit($crate::log::LogLevel::Error, $subsystem, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! rtlog_warn {
    ($subsystem:expr, $($arg:tt)*) => {
        $crate::log::emit($crate::log::LogLevel::Warn, $subsystem, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! rtlog_info {
    ($subsystem:expr, $($arg:tt)*) => {
        $crate::log::emit($crate::log::LogLevel::Info, $subsystem, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! rtlog_debug {
    ($subsystem:expr, $($arg:tt)*) => {
        $crate::log::emit($crate::log::LogLevel::Debug, $subsystem, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! rtlog_trace {
    ($subsystem:expr, $($arg:tt)*) => {
        $crate::log::emit($crate::log::LogLevel::Trace, $subsystem, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering_matches_severity() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn from_u8_roundtrips_known_values() {
        assert_eq!(LogLevel::from_u8(1), LogLevel::Error);
        assert_eq!(LogLevel::from_u8(3), LogLevel::Info);
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }
}
