// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Simulated SPI NOR flash chip
//!
//! Decodes the command stream a [`FlashTransport`] carries and applies it to
//! an in-memory array with NOR semantics: erased bytes read `0xFF`, programs
//! can only clear bits, and every modifying command needs a preceding write
//! enable. Programs, erases and status writes leave the chip busy for a few
//! status reads.
//!
//! Protocol violations a real chip would silently corrupt on (page wrap,
//! quad transfer without QE, wrong enhanced frame shape) panic instead.

use crate::traits::{EnhancedFrame, FlashTransport, Lanes};
use core::ops::Range;
use std::vec::Vec;

const PAGE_SIZE: usize = 256;
const SECTOR_SIZE: usize = 4096;
const BLOCK_32K: usize = 32 * 1024;
const BLOCK_64K: usize = 64 * 1024;

/// SR1 busy bit
pub const SR1_BUSY: u8 = 0x01;
/// SR1 write-enable latch
pub const SR1_WEL: u8 = 0x02;
/// SR1 block protect bits
pub const SR1_BLOCK_PROTECT: u8 = 0x1C;
/// SR2 quad enable
pub const SR2_QE: u8 = 0x02;

/// Manufacturer / device id answered to READ ID
pub const SIM_FLASH_ID: [u8; 2] = [0xEF, 0x17];

/// Status reads a modifying command stays busy for
const DEFAULT_BUSY_READS: u32 = 2;

/// Erase command seen by the chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseKind {
    /// 4 KiB sector
    Sector,
    /// 32 KiB block
    Block32K,
    /// 64 KiB block
    Block64K,
    /// Whole chip
    Chip,
}

/// Command counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashStats {
    /// Erases applied, in order
    pub erases: Vec<(EraseKind, u32)>,
    /// Page program commands applied
    pub programs: usize,
    /// Quad page program commands applied
    pub quad_programs: usize,
    /// Data read commands served
    pub reads: usize,
    /// SR1 reads that reported busy
    pub busy_polls: usize,
    /// Status register writes applied
    pub status_writes: usize,
    /// Largest data phase of any single transfer
    pub max_transfer: usize,
    /// Modifying commands dropped for lack of write enable or protection
    pub rejected: usize,
}

/// Simulated SPI NOR chip
pub struct SimFlash {
    memory: Vec<u8>,
    sr1: u8,
    sr2: u8,
    busy_reads_left: u32,
    busy_reads: u32,
    stuck_busy: bool,
    poisoned: Vec<Range<u32>>,
    stats: FlashStats,
}

impl SimFlash {
    /// Erased chip of `size` bytes
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            memory: std::vec![0xFF; size],
            sr1: 0,
            sr2: 0,
            busy_reads_left: 0,
            busy_reads: DEFAULT_BUSY_READS,
            stuck_busy: false,
            poisoned: Vec::new(),
            stats: FlashStats::default(),
        }
    }

    /// Place `bytes` at `address` directly, bypassing the command set
    pub fn load(&mut self, address: u32, bytes: &[u8]) {
        let start = address as usize;
        self.memory[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Memory contents
    #[must_use]
    pub fn contents(&self, address: u32, len: usize) -> &[u8] {
        &self.memory[address as usize..address as usize + len]
    }

    /// Flip bits of one byte directly
    pub fn corrupt(&mut self, address: u32, mask: u8) {
        self.memory[address as usize] ^= mask;
    }

    /// Set or clear the QE bit directly
    pub fn set_quad_enabled(&mut self, enabled: bool) {
        if enabled {
            self.sr2 |= SR2_QE;
        } else {
            self.sr2 &= !SR2_QE;
        }
    }

    /// Set all block-protect bits
    pub fn protect_all(&mut self) {
        self.sr1 |= SR1_BLOCK_PROTECT;
    }

    /// Keep the busy bit set forever
    pub fn set_stuck_busy(&mut self, stuck: bool) {
        self.stuck_busy = stuck;
    }

    /// Status reads each modifying command stays busy for
    pub fn set_busy_reads(&mut self, reads: u32) {
        self.busy_reads = reads;
    }

    /// Panic if any read touches `range`
    pub fn poison(&mut self, range: Range<u32>) {
        self.poisoned.push(range);
    }

    /// Status register 1 (without the busy bit)
    #[must_use]
    pub const fn sr1(&self) -> u8 {
        self.sr1
    }

    /// Status register 2
    #[must_use]
    pub const fn sr2(&self) -> u8 {
        self.sr2
    }

    /// Command counters
    #[must_use]
    pub const fn stats(&self) -> &FlashStats {
        &self.stats
    }

    /// Reset command counters
    pub fn reset_stats(&mut self) {
        self.stats = FlashStats::default();
    }

    fn busy(&self) -> bool {
        self.stuck_busy || self.busy_reads_left > 0
    }

    fn address24(bytes: &[u8]) -> u32 {
        (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
    }

    fn note_transfer(&mut self, len: usize) {
        self.stats.max_transfer = self.stats.max_transfer.max(len);
    }

    /// Consume the write-enable latch; false if the command must be dropped
    fn take_write_enable(&mut self) -> bool {
        // A busy chip ignores everything but status reads
        let enabled = self.sr1 & SR1_WEL != 0 && !self.busy();
        self.sr1 &= !SR1_WEL;
        if !enabled {
            self.stats.rejected += 1;
        }
        enabled
    }

    fn start_busy(&mut self) {
        self.busy_reads_left = self.busy_reads;
    }

    fn protected(&mut self) -> bool {
        let protected = self.sr1 & SR1_BLOCK_PROTECT != 0;
        if protected {
            self.stats.rejected += 1;
        }
        protected
    }

    fn erase(&mut self, kind: EraseKind, address: u32) {
        if !self.take_write_enable() || self.protected() {
            return;
        }
        let span = match kind {
            EraseKind::Sector => SECTOR_SIZE,
            EraseKind::Block32K => BLOCK_32K,
            EraseKind::Block64K => BLOCK_64K,
            EraseKind::Chip => self.memory.len(),
        };
        let start = if kind == EraseKind::Chip {
            0
        } else {
            address as usize & !(span - 1)
        };
        let end = (start + span).min(self.memory.len());
        self.memory[start..end].fill(0xFF);
        self.stats.erases.push((kind, address));
        self.start_busy();
    }

    fn program(&mut self, address: u32, data: &[u8]) {
        if !self.take_write_enable() || self.protected() {
            return;
        }
        let start = address as usize;
        let page_end = (start / PAGE_SIZE + 1) * PAGE_SIZE;
        assert!(
            start + data.len() <= page_end,
            "page program at {address:#x} of {} bytes wraps a page",
            data.len()
        );
        for (cell, &byte) in self.memory[start..start + data.len()].iter_mut().zip(data) {
            *cell &= byte;
        }
        self.note_transfer(data.len());
        self.stats.programs += 1;
        self.start_busy();
    }

    fn read(&mut self, address: u32, buffer: &mut [u8]) {
        let end = address + buffer.len() as u32;
        for range in &self.poisoned {
            assert!(
                end <= range.start || address >= range.end,
                "read of {address:#x}..{end:#x} touched poisoned {range:?}"
            );
        }
        let start = address as usize;
        buffer.copy_from_slice(&self.memory[start..start + buffer.len()]);
        self.note_transfer(buffer.len());
        self.stats.reads += 1;
    }

    fn require_quad(&self, lanes: Lanes, opcode: u32) {
        if lanes == Lanes::Quad {
            assert!(self.sr2 & SR2_QE != 0, "quad command {opcode:#04x} without QE");
        }
    }

    fn expect_frame(opcode: u32, frame: &EnhancedFrame, expected: EnhancedFrame) {
        assert_eq!(*frame, expected, "wrong frame for command {opcode:#04x}");
    }
}

impl FlashTransport for SimFlash {
    fn send(&mut self, command: &[u8], payload: &[u8]) {
        match command {
            [0x06] => self.sr1 |= SR1_WEL,
            [0x04] => self.sr1 &= !SR1_WEL,
            [0x01, r1, r2] => {
                if self.take_write_enable() {
                    self.sr1 = r1 & !(SR1_BUSY | SR1_WEL);
                    self.sr2 = *r2;
                    self.stats.status_writes += 1;
                    self.start_busy();
                }
            }
            [0x20, a @ ..] => self.erase(EraseKind::Sector, Self::address24(a)),
            [0x52, a @ ..] => self.erase(EraseKind::Block32K, Self::address24(a)),
            [0xD8, a @ ..] => self.erase(EraseKind::Block64K, Self::address24(a)),
            [0x60] => self.erase(EraseKind::Chip, 0),
            [0x02, a @ ..] => self.program(Self::address24(a), payload),
            [0xFF, 0xFF] => {}
            other => panic!("unknown flash command {other:02x?}"),
        }
    }

    fn receive(&mut self, command: &[u8], buffer: &mut [u8]) {
        match command {
            [0x05] => {
                let busy = self.busy();
                if busy {
                    self.stats.busy_polls += 1;
                    self.busy_reads_left = self.busy_reads_left.saturating_sub(1);
                }
                buffer[0] = self.sr1 | u8::from(busy);
            }
            [0x35] => buffer[0] = self.sr2,
            [0x90, 0, 0, 0] => {
                let n = buffer.len().min(SIM_FLASH_ID.len());
                buffer[..n].copy_from_slice(&SIM_FLASH_ID[..n]);
            }
            [0x03, a @ ..] => self.read(Self::address24(a), buffer),
            [0x0B, a0, a1, a2, 0xFF] => self.read(Self::address24(&[*a0, *a1, *a2]), buffer),
            other => panic!("unknown flash read command {other:02x?}"),
        }
    }

    fn send_enhanced(&mut self, frame: &EnhancedFrame, command: &[u32], payload: &[u8]) {
        match command {
            [0x32, address] => {
                Self::expect_frame(
                    0x32,
                    frame,
                    EnhancedFrame {
                        lanes: Lanes::Quad,
                        address_bits: 24,
                        wait_cycles: 0,
                        address_on_lanes: false,
                    },
                );
                self.require_quad(frame.lanes, 0x32);
                self.program(*address, payload);
                self.stats.quad_programs += 1;
            }
            other => panic!("unknown enhanced flash command {other:x?}"),
        }
    }

    fn receive_enhanced(&mut self, frame: &EnhancedFrame, command: &[u32], buffer: &mut [u8]) {
        let [opcode, word] = command else {
            panic!("enhanced read takes opcode and address words, got {command:x?}");
        };
        let frame_of = |lanes, address_bits, wait_cycles, address_on_lanes| EnhancedFrame {
            lanes,
            address_bits,
            wait_cycles,
            address_on_lanes,
        };
        let (expected, address) = match opcode {
            0x3B => (frame_of(Lanes::Dual, 24, 8, false), *word),
            0xBB => (frame_of(Lanes::Dual, 32, 0, true), word >> 8),
            0x6B => (frame_of(Lanes::Quad, 24, 8, false), *word),
            0xEB => (frame_of(Lanes::Quad, 32, 4, true), word >> 8),
            other => panic!("unknown enhanced read command {other:#04x}"),
        };
        Self::expect_frame(*opcode, frame, expected);
        self.require_quad(frame.lanes, *opcode);
        self.read(address, buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_requires_write_enable() {
        let mut flash = SimFlash::new(SECTOR_SIZE);
        flash.send(&[0x02, 0, 0, 0], &[0x00]);
        assert_eq!(flash.contents(0, 1), &[0xFF]);
        assert_eq!(flash.stats().rejected, 1);

        flash.send(&[0x06], &[]);
        flash.send(&[0x02, 0, 0, 0], &[0x5A]);
        assert_eq!(flash.contents(0, 1), &[0x5A]);
    }

    #[test]
    fn test_program_only_clears_bits() {
        let mut flash = SimFlash::new(SECTOR_SIZE);
        flash.load(0, &[0xF0]);
        flash.send(&[0x06], &[]);
        flash.send(&[0x02, 0, 0, 0], &[0x0F]);
        assert_eq!(flash.contents(0, 1), &[0x00]);
    }

    #[test]
    fn test_busy_for_configured_reads() {
        let mut flash = SimFlash::new(SECTOR_SIZE);
        flash.send(&[0x06], &[]);
        flash.send(&[0x20, 0, 0, 0], &[]);
        let mut sr = [0u8];
        flash.receive(&[0x05], &mut sr);
        assert_eq!(sr[0] & SR1_BUSY, SR1_BUSY);
        flash.receive(&[0x05], &mut sr);
        flash.receive(&[0x05], &mut sr);
        assert_eq!(sr[0] & SR1_BUSY, 0);
        assert_eq!(flash.stats().busy_polls, 2);
    }

    #[test]
    #[should_panic(expected = "wraps a page")]
    fn test_page_wrap_panics() {
        let mut flash = SimFlash::new(SECTOR_SIZE);
        flash.send(&[0x06], &[]);
        flash.send(&[0x02, 0, 0, 0xF0], &[0u8; 32]);
    }

    #[test]
    #[should_panic(expected = "without QE")]
    fn test_quad_read_requires_qe() {
        let mut flash = SimFlash::new(SECTOR_SIZE);
        let frame = EnhancedFrame {
            lanes: Lanes::Quad,
            address_bits: 32,
            wait_cycles: 4,
            address_on_lanes: true,
        };
        let mut buf = [0u8; 4];
        flash.receive_enhanced(&frame, &[0xEB, 0], &mut buf);
    }

    #[test]
    fn test_protected_chip_ignores_erase() {
        let mut flash = SimFlash::new(SECTOR_SIZE);
        flash.load(0, &[0x00]);
        flash.protect_all();
        flash.send(&[0x06], &[]);
        flash.send(&[0x20, 0, 0, 0], &[]);
        assert_eq!(flash.contents(0, 1), &[0x00]);
    }
}
