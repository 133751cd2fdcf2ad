// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! RISC-V core-local interruptor (CLINT)
//!
//! CLINT provides:
//! - Machine Timer (mtime), used here for busy-wait delays
//! - Machine Software Interrupt (MSIP), used to wake the second core
//!
//! One driver value is bound to one hart. It only touches that hart's MSIP
//! word and `mie` bit, except for [`Clint::send_ipi`].

use super::csr;
use crate::traits::{DelayInterface, InterProcessorInterrupt};

/// CLINT base on the K210
pub const CLINT_BASE: usize = 0x0200_0000;

/// K210 mtime frequency (CPU clock / 50)
pub const K210_TIMER_FREQUENCY: u64 = 7_800_000;

/// Per-hart MSIP words start at the base, 4 bytes apart
const MSIP_STRIDE: usize = 4;
/// Free-running 64-bit timer
const MTIME_OFFSET: usize = 0xBFF8;

/// CLINT driver
pub struct Clint {
    /// Base address
    base: usize,
    /// Timer frequency in Hz
    frequency: u64,
    /// Hart this driver belongs to
    hart_id: usize,
}

impl Clint {
    /// Create a new CLINT driver for `hart_id`
    #[must_use]
    pub const fn new(base: usize, frequency: u64, hart_id: usize) -> Self {
        Self {
            base,
            frequency,
            hart_id,
        }
    }

    /// Driver for `hart_id` at the K210 base and timer rate
    #[must_use]
    pub const fn for_hart(hart_id: usize) -> Self {
        Self::new(CLINT_BASE, K210_TIMER_FREQUENCY, hart_id)
    }

    const fn msip(&self, hart: usize) -> *mut u32 {
        (self.base + hart * MSIP_STRIDE) as *mut u32
    }

    /// Read the timer
    #[must_use]
    pub fn read_mtime(&self) -> u64 {
        // SAFETY: `base` names the CLINT block, which is always mapped; mtime
        // is a read-only MMIO word.
        unsafe { core::ptr::read_volatile((self.base + MTIME_OFFSET) as *const u64) }
    }

    /// Raise the software interrupt of `target_hart`
    pub fn send_ipi(&self, target_hart: usize) {
        // SAFETY: MSIP word of a hart inside the CLINT block; writing 1 only
        // sets that hart's pending bit.
        unsafe { core::ptr::write_volatile(self.msip(target_hart), 1) }
    }

    /// Drop this hart's pending software interrupt
    pub fn clear_ipi(&self) {
        // SAFETY: this hart's own MSIP word.
        unsafe { core::ptr::write_volatile(self.msip(self.hart_id), 0) }
    }

    /// Check this hart's software interrupt
    #[must_use]
    pub fn is_ipi_pending(&self) -> bool {
        // SAFETY: this hart's own MSIP word; reading has no side effect.
        unsafe { core::ptr::read_volatile(self.msip(self.hart_id)) & 1 != 0 }
    }

    /// Get timer frequency
    #[must_use]
    pub const fn frequency(&self) -> u64 {
        self.frequency
    }

    /// Timer ticks spanning `us` microseconds
    #[must_use]
    pub const fn ticks_for_us(&self, us: u64) -> u64 {
        (us * self.frequency) / 1_000_000
    }

    /// Microseconds spanned by `ticks`
    #[must_use]
    pub const fn ticks_to_us(&self, ticks: u64) -> u64 {
        ticks * 1_000_000 / self.frequency
    }
}

impl InterProcessorInterrupt for Clint {
    fn hart_id(&self) -> usize {
        self.hart_id
    }

    fn init(&mut self) {
        // Start masked; the caller clears and enables explicitly
        csr::clear_mie(csr::MIE_MSIE);
    }

    fn clear(&mut self) {
        self.clear_ipi();
    }

    fn enable(&mut self) {
        // Only the mie bit: wfi wakes on a pending enabled interrupt even
        // with mstatus.MIE clear, so no trap handler is needed
        csr::set_mie(csr::MIE_MSIE);
    }

    fn disable(&mut self) {
        csr::clear_mie(csr::MIE_MSIE);
    }

    fn send(&mut self, target: usize) {
        self.send_ipi(target);
    }

    fn is_pending(&self) -> bool {
        self.is_ipi_pending()
    }

    fn wait(&mut self) {
        csr::wfi();
    }
}

impl DelayInterface for Clint {
    fn delay_us(&mut self, us: u32) {
        let deadline = self.ticks_for_us(u64::from(us));
        let t0 = self.read_mtime();
        while self.read_mtime().wrapping_sub(t0) < deadline {
            core::hint::spin_loop();
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay_us(ms.saturating_mul(1000));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_conversion() {
        let clint = Clint::for_hart(0);

        // 7.8 million ticks = 1 second
        assert_eq!(clint.ticks_to_us(K210_TIMER_FREQUENCY), 1_000_000);
        assert_eq!(clint.ticks_for_us(1_000), 7_800);
    }

    #[test]
    fn test_msip_layout() {
        let clint = Clint::for_hart(0);
        assert_eq!(clint.msip(0) as usize, 0x0200_0000);
        assert_eq!(clint.msip(1) as usize, 0x0200_0004);
    }

    #[test]
    fn test_bound_to_hart() {
        let clint = Clint::new(CLINT_BASE, K210_TIMER_FREQUENCY, 1);
        assert_eq!(InterProcessorInterrupt::hart_id(&clint), 1);
    }
}
