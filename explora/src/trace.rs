// src/trace.rs
//
// Minimal trace logging seam. Implementations are selected by the
// `trace.log.implementation` config key; the default discards
// everything so library users opt in to diagnostics.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl TraceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceLevel::Debug => "DEBUG",
            TraceLevel::Info => "INFO",
            TraceLevel::Warn => "WARN",
            TraceLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait TraceLogger: Send + Sync {
    fn log(&self, level: TraceLevel, message: &str);

    fn info(&self, message: &str) {
        self.log(TraceLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(TraceLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(TraceLevel::Error, message);
    }
}

/// Discards all trace output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTrace;

impl TraceLogger for NullTrace {
    fn log(&self, _level: TraceLevel, _message: &str) {
        // intentionally no-op
    }
}

/// Writes `LEVEL: message` lines to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrTrace;

impl TraceLogger for StderrTrace {
    fn log(&self, level: TraceLevel, message: &str) {
        eprintln!("{}: {}", level.as_str(), message);
    }
}
