//! The world's log sink.
//!
//! Every emitted record routes through [`tracing`], which already serializes
//! writers behind its own subscriber — the design's "log mutex" is this
//! subsumed rather than reimplemented. [`LogSink`] only tracks the
//! configured [`LogLevel`] threshold and the one-character debug-out path
//! used by `RNN` instructions.

use std::fmt;

use tracing::{debug, error, info, trace, warn};

/// Severity threshold for the world's log sink. Ordered from least to most
/// verbose; `level >= other` reads as "at least as verbose as".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    None = 0,
    Fatal = 1,
    Error = 2,
    Warning = 3,
    Info = 4,
    Debug = 5,
}

impl LogLevel {
    /// `Debug` downgrades to `Info` outside of debug builds; release hosts
    /// never pay for per-instruction trace volume.
    pub const fn effective(self) -> LogLevel {
        if cfg!(debug_assertions) {
            self
        } else if matches!(self, LogLevel::Debug) {
            LogLevel::Info
        } else {
            self
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::None => "none",
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        write!(f, "{name}")
    }
}

/// The world's configured log threshold plus the routines that route
/// records through [`tracing`] at that threshold.
#[derive(Debug, Clone, Copy)]
pub struct LogSink {
    level: LogLevel,
}

impl LogSink {
    pub fn new(level: LogLevel) -> LogSink {
        LogSink {
            level: level.effective(),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level <= self.level
    }

    /// Emits a one-character `debug_out` record. Per the instruction set's
    /// semantics this only happens when the sink's level is `>= Info`.
    pub fn debug_out(&self, byte: u8) {
        if self.enabled(LogLevel::Info) {
            let ch = byte as char;
            trace!(target: "hazna::debug_out", byte, %ch);
        }
    }

    pub fn fatal(&self, msg: &str) {
        if self.enabled(LogLevel::Fatal) {
            error!(target: "hazna::fatal", "{msg}");
        }
    }

    pub fn error(&self, msg: &str) {
        if self.enabled(LogLevel::Error) {
            error!(target: "hazna", "{msg}");
        }
    }

    pub fn warning(&self, msg: &str) {
        if self.enabled(LogLevel::Warning) {
            warn!(target: "hazna", "{msg}");
        }
    }

    pub fn info(&self, msg: &str) {
        if self.enabled(LogLevel::Info) {
            info!(target: "hazna", "{msg}");
        }
    }

    pub fn debug(&self, msg: &str) {
        if self.enabled(LogLevel::Debug) {
            debug!(target: "hazna", "{msg}");
        }
    }
}

impl Default for LogSink {
    fn default() -> LogSink {
        LogSink::new(LogLevel::Warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_verbosity() {
        assert!(LogLevel::Debug > LogLevel::Info);
        assert!(LogLevel::Info > LogLevel::Warning);
        assert!(LogLevel::None < LogLevel::Fatal);
    }

    #[test]
    fn debug_out_gated_by_info_level() {
        let quiet = LogSink::new(LogLevel::Warning);
        let verbose = LogSink::new(LogLevel::Info);
        assert!(!quiet.enabled(LogLevel::Info));
        assert!(verbose.enabled(LogLevel::Info));
    }
}
