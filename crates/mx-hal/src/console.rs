// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Console log sink
//!
//! Writes each log entry as one line on a [`Console`].

use crate::traits::Console;
use core::fmt::{self, Write};
use mx_common::log::{LogEntry, LogSink};

/// Forwards log entries to a console, one per line
pub struct ConsoleSink<C: Console> {
    console: C,
}

impl<C: Console> ConsoleSink<C> {
    /// Wrap a console
    pub const fn new(console: C) -> Self {
        Self { console }
    }

    /// Access the console
    pub fn console(&mut self) -> &mut C {
        &mut self.console
    }

    /// Unwrap the console
    pub fn into_inner(self) -> C {
        self.console
    }
}

impl<C: Console> Write for ConsoleSink<C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.console.write_str(s);
        Ok(())
    }
}

impl<C: Console> LogSink for ConsoleSink<C> {
    fn emit(&mut self, entry: &LogEntry) {
        let _ = writeln!(self, "{entry}");
    }
}
