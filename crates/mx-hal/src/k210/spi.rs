// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! K210 DesignWare SSI flash transport
//!
//! Blocking command/FIFO transfers to the SPI NOR chip, either the external
//! flash on SPI0 or the internal flash on SPI3. Both are the same
//! DesignWare SSI block; only the `ctrlr0` field offsets differ.
//!
//! Transfers are bounded by the caller to the FIFO depth (32 bytes). Slave
//! select is raised only after the first FIFO fill so the chip never sees a
//! gap inside a frame.

use super::sdk::{self, SysctlClock, SysctlReset};
use crate::traits::{EnhancedFrame, FlashTransport};
use core::ptr;
use mx_common::FlashBus;

// ============================================================================
// SSI Register Offsets
// ============================================================================

/// Control Register 0
const SSI_CTRLR0: usize = 0x00;
/// Control Register 1 (receive frame count)
const SSI_CTRLR1: usize = 0x04;
/// SSI enable
const SSI_SSIENR: usize = 0x08;
/// Slave enable
const SSI_SER: usize = 0x10;
/// Baud rate divider
const SSI_BAUDR: usize = 0x14;
/// Transmit FIFO level
const SSI_TXFLR: usize = 0x20;
/// Receive FIFO level
const SSI_RXFLR: usize = 0x24;
/// Status register
const SSI_SR: usize = 0x28;
/// Interrupt mask
const SSI_IMR: usize = 0x2C;
/// Data register
const SSI_DR: usize = 0x60;
/// Enhanced SPI control
const SSI_SPI_CTRLR0: usize = 0xF4;

// ============================================================================
// Field values
// ============================================================================

/// 8-bit data frames (frame size minus one)
const FRAME_8BIT: u32 = 0x07;
/// Transmit only
const TMOD_TX: u32 = 0x01;
/// Receive only
const TMOD_RX: u32 = 0x02;
/// Transmit command, then receive
const TMOD_EEPROM: u32 = 0x03;

/// SR: busy
const SR_BUSY: u32 = 1 << 0;
/// SR: transmit FIFO empty
const SR_TFE: u32 = 1 << 2;

/// Slave select line of the flash chip
const SLAVE_SELECT: u32 = 0x01;

/// FIFO depth in frames
const FIFO_DEPTH: usize = 32;

/// SSI instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsiInstance {
    /// SPI0, external flash
    Spi0,
    /// SPI3, internal flash
    Spi3,
}

impl SsiInstance {
    /// Get the base address for this instance
    #[must_use]
    pub const fn base_addr(&self) -> usize {
        match self {
            Self::Spi0 => 0x5200_0000,
            Self::Spi3 => 0x5400_0000,
        }
    }

    /// `ctrlr0` field offsets: (data frame size, transfer mode, frame format)
    #[must_use]
    pub const fn field_offsets(&self) -> (u32, u32, u32) {
        match self {
            Self::Spi0 => (16, 8, 21),
            Self::Spi3 => (0, 10, 22),
        }
    }

    /// Instance wired to `bus`
    #[must_use]
    pub const fn for_bus(bus: FlashBus) -> Self {
        match bus {
            FlashBus::External => Self::Spi0,
            FlashBus::Internal => Self::Spi3,
        }
    }
}

/// DesignWare SSI driven as a flash transport
pub struct DwSsi {
    base: usize,
    dfs_offset: u32,
    tmod_offset: u32,
    frf_offset: u32,
}

impl DwSsi {
    /// Create a driver for `instance` without touching hardware
    #[must_use]
    pub const fn new(instance: SsiInstance) -> Self {
        let (dfs_offset, tmod_offset, frf_offset) = instance.field_offsets();
        Self {
            base: instance.base_addr(),
            dfs_offset,
            tmod_offset,
            frf_offset,
        }
    }

    /// Clock, pin-mux and reset the controller wired to `bus`
    #[must_use]
    pub fn open(bus: FlashBus) -> Self {
        let instance = SsiInstance::for_bus(bus);

        sdk::clock_enable(SysctlClock::Fpioa);
        match instance {
            SsiInstance::Spi0 => {
                sdk::reset(SysctlReset::Spi0);
                sdk::clock_enable(SysctlClock::Spi0);
                sdk::clock_set_threshold(sdk::THRESHOLD_SPI0, 0);
                sdk::route_spi0_flash_pins();
            }
            SsiInstance::Spi3 => {
                // The internal flash also holds the running loader; resetting
                // SPI3 or changing its divider would cut the XIP bus
                sdk::clock_disable(SysctlClock::Spi3);
                sdk::clock_enable(SysctlClock::Spi3);
            }
        }

        let mut ssi = Self::new(instance);
        ssi.init();
        ssi
    }

    /// Reset controller state: divider 2, interrupts masked, disabled
    pub fn init(&mut self) {
        self.write(SSI_BAUDR, 0x02);
        self.write(SSI_IMR, 0x00);
        self.write(SSI_SER, 0x00);
        self.write(SSI_SSIENR, 0x00);
    }

    fn write(&self, offset: usize, value: u32) {
        // SAFETY: `base` is one of the two SSI register blocks fixed by
        // SsiInstance and `offset` is a register inside the block. Volatile
        // write is required for correct MMIO semantics.
        unsafe { ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }

    fn read(&self, offset: usize) -> u32 {
        // SAFETY: see `write`.
        unsafe { ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn ctrlr0(&self, tmod: u32, frame_format: u32) -> u32 {
        (FRAME_8BIT << self.dfs_offset)
            | (tmod << self.tmod_offset)
            | (frame_format << self.frf_offset)
    }

    fn tx_room(&self) -> usize {
        FIFO_DEPTH.saturating_sub(self.read(SSI_TXFLR) as usize)
    }

    fn fill_tx(&self, payload: &mut core::slice::Iter<'_, u8>) {
        for _ in 0..self.tx_room() {
            match payload.next() {
                Some(&byte) => self.write(SSI_DR, u32::from(byte)),
                None => break,
            }
        }
    }

    fn drain_rx(&self, buffer: &mut [u8]) {
        let mut filled = 0;
        while filled < buffer.len() {
            let level = (self.read(SSI_RXFLR) as usize).min(buffer.len() - filled);
            for slot in &mut buffer[filled..filled + level] {
                *slot = self.read(SSI_DR) as u8;
            }
            filled += level;
        }
    }

    fn finish_tx(&self, payload: &mut core::slice::Iter<'_, u8>) {
        self.write(SSI_SER, SLAVE_SELECT);
        while payload.len() > 0 {
            self.fill_tx(payload);
        }
        while self.read(SSI_SR) & (SR_TFE | SR_BUSY) != SR_TFE {
            core::hint::spin_loop();
        }
        self.release();
    }

    fn release(&self) {
        self.write(SSI_SER, 0x00);
        self.write(SSI_SSIENR, 0x00);
    }

    fn set_rx_frames(&self, len: usize) {
        self.write(SSI_CTRLR1, (len as u32).saturating_sub(1));
    }
}

impl FlashTransport for DwSsi {
    fn send(&mut self, command: &[u8], payload: &[u8]) {
        self.write(SSI_CTRLR0, self.ctrlr0(TMOD_TX, 0));
        self.write(SSI_SSIENR, 0x01);
        for &byte in command {
            self.write(SSI_DR, u32::from(byte));
        }
        let mut data = payload.iter();
        self.fill_tx(&mut data);
        self.finish_tx(&mut data);
    }

    fn receive(&mut self, command: &[u8], buffer: &mut [u8]) {
        self.write(SSI_CTRLR0, self.ctrlr0(TMOD_EEPROM, 0));
        self.set_rx_frames(buffer.len());
        self.write(SSI_SSIENR, 0x01);
        for &byte in command {
            self.write(SSI_DR, u32::from(byte));
        }
        self.write(SSI_SER, SLAVE_SELECT);
        self.drain_rx(buffer);
        self.release();
    }

    fn send_enhanced(&mut self, frame: &EnhancedFrame, command: &[u32], payload: &[u8]) {
        self.write(SSI_CTRLR0, self.ctrlr0(TMOD_TX, frame.lanes.frame_format()));
        self.write(SSI_SPI_CTRLR0, frame.spi_ctrlr0());
        self.write(SSI_SSIENR, 0x01);
        for &word in command {
            self.write(SSI_DR, word);
        }
        let mut data = payload.iter();
        self.fill_tx(&mut data);
        self.finish_tx(&mut data);
    }

    fn receive_enhanced(&mut self, frame: &EnhancedFrame, command: &[u32], buffer: &mut [u8]) {
        self.write(SSI_CTRLR0, self.ctrlr0(TMOD_RX, frame.lanes.frame_format()));
        self.write(SSI_SPI_CTRLR0, frame.spi_ctrlr0());
        self.set_rx_frames(buffer.len());
        self.write(SSI_SSIENR, 0x01);
        for &word in command {
            self.write(SSI_DR, word);
        }
        self.write(SSI_SER, SLAVE_SELECT);
        self.drain_rx(buffer);
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_layout() {
        assert_eq!(SsiInstance::Spi0.base_addr(), 0x5200_0000);
        assert_eq!(SsiInstance::Spi3.base_addr(), 0x5400_0000);
        assert_eq!(SsiInstance::for_bus(FlashBus::Internal), SsiInstance::Spi3);
    }

    #[test]
    fn test_ctrlr0_offsets() {
        let spi3 = DwSsi::new(SsiInstance::Spi3);
        assert_eq!(spi3.ctrlr0(TMOD_EEPROM, 0), 0x07 | (0x03 << 10));
        assert_eq!(spi3.ctrlr0(TMOD_RX, 2), 0x07 | (0x02 << 10) | (0x02 << 22));

        let spi0 = DwSsi::new(SsiInstance::Spi0);
        assert_eq!(spi0.ctrlr0(TMOD_TX, 0), (0x07 << 16) | (0x01 << 8));
    }
}
