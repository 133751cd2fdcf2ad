// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Host-side test doubles
//!
//! Stand-ins for the K210 peripherals so the boot logic can run under
//! `cargo test`: a SPI NOR chip, the software-interrupt fabric, per-hart
//! control, delays, the console and the OTP key path.

pub mod flash;
pub mod ipi;

pub use flash::{EraseKind, FlashStats, SimFlash};
pub use ipi::{IpiEvent, SimInterconnect, SimIpi};

use crate::traits::{Console, CoreControl, DelayInterface, KeyStore};
use std::string::String;
use std::sync::{Arc, Mutex};
use std::vec::Vec;

/// Operation recorded by a [`SimCore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreEvent {
    /// Interrupt state cleared and caches fenced
    Quiesced,
    /// Control transferred to an entry point
    Entered(usize),
}

/// Simulated hart
///
/// `enter` records the jump and then panics with
/// `"hart N entered image at 0x..."`, which tests catch to end the thread.
#[derive(Debug, Clone)]
pub struct SimCore {
    hart: usize,
    events: Arc<Mutex<Vec<CoreEvent>>>,
}

impl SimCore {
    /// Core for `hart`
    #[must_use]
    pub fn new(hart: usize) -> Self {
        Self {
            hart,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Operations recorded so far (shared with clones)
    #[must_use]
    pub fn events(&self) -> Vec<CoreEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn record(&self, event: CoreEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event);
    }
}

impl CoreControl for SimCore {
    fn hart_id(&self) -> usize {
        self.hart
    }

    fn quiesce(&mut self) {
        self.record(CoreEvent::Quiesced);
    }

    fn enter(&mut self, entry: usize) -> ! {
        self.record(CoreEvent::Entered(entry));
        panic!("hart {} entered image at {entry:#x}", self.hart);
    }
}

/// Delay that only accounts time
#[derive(Debug, Default, Clone)]
pub struct SimDelay {
    elapsed_us: u64,
    requests_ms: Vec<u32>,
}

impl SimDelay {
    /// Idle delay
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total requested delay in microseconds
    #[must_use]
    pub const fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    /// Millisecond delays requested, in order
    #[must_use]
    pub fn requests_ms(&self) -> &[u32] {
        &self.requests_ms
    }
}

impl DelayInterface for SimDelay {
    fn delay_us(&mut self, us: u32) {
        self.elapsed_us += u64::from(us);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.requests_ms.push(ms);
        self.elapsed_us += u64::from(ms) * 1000;
    }
}

/// Console capturing output into a shared string
#[derive(Debug, Default, Clone)]
pub struct SimConsole {
    output: Arc<Mutex<String>>,
}

impl SimConsole {
    /// Empty console
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far (shared with clones)
    #[must_use]
    pub fn output(&self) -> String {
        self.output
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Console for SimConsole {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.output
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_str(&String::from_utf8_lossy(bytes));
    }
}

/// Key path transition recorded by a [`SimKeyStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// Key routed to the cipher engine
    Enabled,
    /// Key path cut
    Disabled,
}

/// OTP key path double
#[derive(Debug, Default, Clone)]
pub struct SimKeyStore {
    enabled: bool,
    events: Vec<KeyEvent>,
}

impl SimKeyStore {
    /// Key path closed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the key is currently routed
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Transitions so far
    #[must_use]
    pub fn events(&self) -> &[KeyEvent] {
        &self.events
    }
}

impl KeyStore for SimKeyStore {
    fn enable_key_output(&mut self) {
        self.enabled = true;
        self.events.push(KeyEvent::Enabled);
    }

    fn disable_key_output(&mut self) {
        self.enabled = false;
        self.events.push(KeyEvent::Disabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_records_before_panicking() {
        let core = SimCore::new(1);
        let mut jumper = core.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            jumper.quiesce();
            jumper.enter(0x8000_0000)
        }));
        assert!(result.is_err());
        assert_eq!(
            core.events(),
            [CoreEvent::Quiesced, CoreEvent::Entered(0x8000_0000)]
        );
    }

    #[test]
    fn test_delay_accounts_time() {
        let mut delay = SimDelay::new();
        delay.delay_ms(20);
        delay.delay_us(5);
        assert_eq!(delay.elapsed_us(), 20_005);
        assert_eq!(delay.requests_ms(), &[20]);
    }
}
