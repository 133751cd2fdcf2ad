// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Logging infrastructure for the MAIX loader
//!
//! Entries are kept in a small circular buffer and forwarded to a sink (the
//! UART console on hardware) as they are produced, so boot progress is
//! visible before the handoff. The buffer keeps the most recent entries for
//! inspection after a failure.
//!
//! # Security
//!
//! - Key material must never be logged
//! - Digests are only printed at debug level

use core::fmt::{self, Write};
use heapless::{Deque, String};

/// Maximum log message length
pub const MAX_LOG_MESSAGE_LEN: usize = 128;

/// Log buffer size (number of entries)
pub const LOG_BUFFER_SIZE: usize = 32;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    /// Errors that stop the boot
    Error = 0,
    /// Recoverable anomalies (slot divergence, repair)
    Warn = 1,
    /// Boot progress
    Info = 2,
    /// Debug builds only
    Debug = 3,
    /// Very verbose
    Trace = 4,
}

impl LogLevel {
    /// Get the log level name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    /// Get a short prefix for the log level
    #[must_use]
    pub const fn prefix(&self) -> char {
        match self {
            Self::Error => 'E',
            Self::Warn => 'W',
            Self::Info => 'I',
            Self::Debug => 'D',
            Self::Trace => 'T',
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log entry structure
#[derive(Clone)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Position of the entry in the boot's log stream
    pub sequence: u32,
    /// Module/component name
    pub module: &'static str,
    /// Log message
    pub message: String<MAX_LOG_MESSAGE_LEN>,
}

impl LogEntry {
    /// Create a new log entry
    #[must_use]
    pub fn new(level: LogLevel, sequence: u32, module: &'static str, message: &str) -> Self {
        let mut msg = String::new();
        let mut end = message.len().min(MAX_LOG_MESSAGE_LEN);
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        let _ = msg.push_str(&message[..end]);

        Self {
            level,
            sequence,
            module,
            message: msg,
        }
    }
}

impl fmt::Debug for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:04}] {} [{}] {}",
            self.sequence,
            self.level.prefix(),
            self.module,
            self.message
        )
    }
}

/// The most recent [`LOG_BUFFER_SIZE`] entries at or above a level
pub struct LogBuffer {
    ring: Deque<LogEntry, LOG_BUFFER_SIZE>,
    min_level: LogLevel,
}

impl LogBuffer {
    /// Empty buffer recording `Info` and above
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: Deque::new(),
            min_level: LogLevel::Info,
        }
    }

    /// Set the minimum log level
    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Get the minimum log level
    #[must_use]
    pub const fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Check if `level` passes the filter
    #[must_use]
    pub fn should_log(&self, level: LogLevel) -> bool {
        level <= self.min_level
    }

    /// Record `entry`, evicting the oldest when full
    pub fn write(&mut self, entry: LogEntry) {
        if !self.should_log(entry.level) {
            return;
        }
        if self.ring.is_full() {
            self.ring.pop_front();
        }
        // Cannot fail: a slot was just freed
        let _ = self.ring.push_back(entry);
    }

    /// Entries held
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Check if nothing is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.ring.clear();
    }

    /// Entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> + '_ {
        self.ring.iter()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Destination for log entries as they are produced
pub trait LogSink {
    /// Emit one entry
    fn emit(&mut self, entry: &LogEntry);
}

/// Discards everything
impl LogSink for () {
    fn emit(&mut self, _entry: &LogEntry) {}
}

impl<S: LogSink + ?Sized> LogSink for &mut S {
    fn emit(&mut self, entry: &LogEntry) {
        (**self).emit(entry);
    }
}

/// Buffered logger forwarding to a sink
pub struct Logger<S: LogSink> {
    buffer: LogBuffer,
    sink: S,
    sequence: u32,
}

impl<S: LogSink> Logger<S> {
    /// Create a logger at `Info` level
    pub fn new(sink: S) -> Self {
        Self {
            buffer: LogBuffer::new(),
            sink,
            sequence: 0,
        }
    }

    /// Set the minimum level recorded and forwarded
    pub fn set_min_level(&mut self, level: LogLevel) {
        self.buffer.set_min_level(level);
    }

    /// Get the minimum level
    #[must_use]
    pub const fn min_level(&self) -> LogLevel {
        self.buffer.min_level()
    }

    /// Log with format arguments
    pub fn log(&mut self, level: LogLevel, module: &'static str, args: fmt::Arguments<'_>) {
        if !self.buffer.should_log(level) {
            return;
        }

        let mut message = String::<MAX_LOG_MESSAGE_LEN>::new();
        // Over-long messages are truncated at the buffer capacity
        let _ = message.write_fmt(args);

        let entry = LogEntry {
            level,
            sequence: self.sequence,
            module,
            message,
        };
        self.sequence = self.sequence.wrapping_add(1);

        self.sink.emit(&entry);
        self.buffer.write(entry);
    }

    /// Recent entries
    #[must_use]
    pub const fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    /// Access the sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the sink
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the logger and return its sink
    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($logger:expr, $module:expr, $($arg:tt)*) => {
        $logger.log($crate::log::LogLevel::Error, $module, format_args!($($arg)*))
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $module:expr, $($arg:tt)*) => {
        $logger.log($crate::log::LogLevel::Warn, $module, format_args!($($arg)*))
    };
}

/// Log an informational message
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $module:expr, $($arg:tt)*) => {
        $logger.log($crate::log::LogLevel::Info, $module, format_args!($($arg)*))
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $module:expr, $($arg:tt)*) => {
        $logger.log($crate::log::LogLevel::Debug, $module, format_args!($($arg)*))
    };
}

/// Log a trace-level message
#[macro_export]
macro_rules! log_trace {
    ($logger:expr, $module:expr, $($arg:tt)*) => {
        $logger.log($crate::log::LogLevel::Trace, $module, format_args!($($arg)*))
    };
}
