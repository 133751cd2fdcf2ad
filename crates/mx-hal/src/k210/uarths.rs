// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! K210 high-speed UART (UARTHS) console
//!
//! Transmit-only, 115200 8N1. Used for boot progress and the handoff banner.

use super::sdk::{self, SysctlClock};
use crate::traits::Console;
use core::ptr;

/// UARTHS base address
const UARTHS_BASE: usize = 0x3800_0000;

/// Transmit data register
const UARTHS_TXDATA: usize = 0x00;
/// Transmit control register
const UARTHS_TXCTRL: usize = 0x08;
/// Baud divider register
const UARTHS_DIV: usize = 0x18;

/// TXDATA: FIFO full
const TXDATA_FULL: u32 = 1 << 31;
/// TXCTRL: transmit enable
const TXCTRL_TXEN: u32 = 0x01;

/// Console baud rate
pub const CONSOLE_BAUD: u32 = 115_200;

/// UARTHS console
pub struct Uarths {
    base: usize,
}

impl Uarths {
    /// Create the driver without touching hardware
    #[must_use]
    pub const fn new() -> Self {
        Self { base: UARTHS_BASE }
    }

    /// Program the baud divider from the CPU clock and enable transmit
    pub fn init(&mut self) {
        let divider = (sdk::clock_frequency(SysctlClock::Cpu) / CONSOLE_BAUD).saturating_sub(1);
        self.write(UARTHS_DIV, divider & 0xFFFF);
        self.write(UARTHS_TXCTRL, TXCTRL_TXEN);
    }

    fn write(&self, offset: usize, value: u32) {
        // SAFETY: UARTHS registers live at fixed offsets from UARTHS_BASE.
        // Volatile access is required for correct MMIO semantics.
        unsafe { ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }

    fn read(&self, offset: usize) -> u32 {
        // SAFETY: see `write`.
        unsafe { ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn put(&mut self, byte: u8) {
        while self.read(UARTHS_TXDATA) & TXDATA_FULL != 0 {
            core::hint::spin_loop();
        }
        self.write(UARTHS_TXDATA, u32::from(byte));
    }
}

impl Default for Uarths {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for Uarths {
    fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                self.put(b'\r');
            }
            self.put(byte);
        }
    }
}
