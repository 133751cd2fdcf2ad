// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! SPI NOR block device
//!
//! Byte-addressed read, program and erase on top of a [`FlashTransport`].
//! The device keeps no dialect state: every read names its [`Dialect`] and
//! every program its [`ProgramMode`]. Quad dialects additionally need the
//! chip's QE bit, see [`FlashDevice::enable_quad_mode`].
//!
//! Transfers are cut to the controller FIFO depth and programs never cross
//! a page boundary. Busy waits are bounded by the configured status poll
//! budget; running out of it is the only source of [`FlashError::Timeout`].

use core::fmt;

use mx_common::config::FlashConfig;
use mx_common::constants::{FLASH_PAGE_SIZE, FLASH_SECTOR_SIZE, SPI_FIFO_DEPTH};
use mx_common::{Dialect, Error, ProgramMode};
use mx_hal::{EnhancedFrame, FlashTransport, Lanes};

use crate::retry::{PollHook, RetryPolicy, SpinHook};

/// SPI NOR opcodes
pub mod opcode {
    /// Write enable
    pub const WRITE_ENABLE: u8 = 0x06;
    /// Read status register 1
    pub const READ_STATUS1: u8 = 0x05;
    /// Read status register 2
    pub const READ_STATUS2: u8 = 0x35;
    /// Write status registers 1 and 2
    pub const WRITE_STATUS: u8 = 0x01;
    /// Read
    pub const READ: u8 = 0x03;
    /// Fast read
    pub const FAST_READ: u8 = 0x0B;
    /// Fast read, dual output
    pub const READ_DUAL_OUTPUT: u8 = 0x3B;
    /// Fast read, dual I/O
    pub const READ_DUAL_IO: u8 = 0xBB;
    /// Fast read, quad output
    pub const READ_QUAD_OUTPUT: u8 = 0x6B;
    /// Fast read, quad I/O
    pub const READ_QUAD_IO: u8 = 0xEB;
    /// Page program
    pub const PAGE_PROGRAM: u8 = 0x02;
    /// Quad page program
    pub const QUAD_PAGE_PROGRAM: u8 = 0x32;
    /// 4 KiB sector erase
    pub const SECTOR_ERASE: u8 = 0x20;
    /// 32 KiB block erase
    pub const BLOCK_32K_ERASE: u8 = 0x52;
    /// 64 KiB block erase
    pub const BLOCK_64K_ERASE: u8 = 0xD8;
    /// Chip erase
    pub const CHIP_ERASE: u8 = 0x60;
    /// Manufacturer/device id
    pub const READ_ID: u8 = 0x90;
    /// Leaves continuous read mode
    pub const RESET_CONTINUOUS_READ: [u8; 2] = [0xFF, 0xFF];
}

/// Status register 1: write in progress
pub const STATUS1_BUSY: u8 = 0x01;
/// Status register 2: quad enable
pub const STATUS2_QE: u8 = 0x02;
/// Status register 2 bits kept when clearing block protection
const STATUS2_KEEP_ON_UNPROTECT: u8 = 0x03;

const FRAME_DUAL_OUTPUT: EnhancedFrame = EnhancedFrame {
    lanes: Lanes::Dual,
    address_bits: 24,
    wait_cycles: 8,
    address_on_lanes: false,
};

const FRAME_DUAL_IO: EnhancedFrame = EnhancedFrame {
    lanes: Lanes::Dual,
    address_bits: 32,
    wait_cycles: 0,
    address_on_lanes: true,
};

const FRAME_QUAD_OUTPUT: EnhancedFrame = EnhancedFrame {
    lanes: Lanes::Quad,
    address_bits: 24,
    wait_cycles: 8,
    address_on_lanes: false,
};

const FRAME_QUAD_IO: EnhancedFrame = EnhancedFrame {
    lanes: Lanes::Quad,
    address_bits: 32,
    wait_cycles: 4,
    address_on_lanes: true,
};

const FRAME_QUAD_PROGRAM: EnhancedFrame = EnhancedFrame {
    lanes: Lanes::Quad,
    address_bits: 24,
    wait_cycles: 0,
    address_on_lanes: false,
};

// ============================================================================
// Errors
// ============================================================================

/// Block device errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// Erase start is not sector aligned
    Alignment {
        /// Requested start
        address: u32,
    },
    /// Erase of zero bytes
    ZeroLength,
    /// Busy bit still set after the poll budget
    Timeout,
    /// Access runs past the end of the chip
    OutOfRange {
        /// Requested start
        address: u32,
        /// Requested length
        len: usize,
    },
}

impl FlashError {
    /// Get error code
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::Timeout => 0x0201,
            Self::Alignment { .. } => 0x0202,
            Self::ZeroLength => 0x0203,
            Self::OutOfRange { .. } => 0x0204,
        }
    }

    /// Get error description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Timeout => "flash operation timeout",
            Self::Alignment { .. } => "flash offset not sector aligned",
            Self::ZeroLength => "length must be larger than 0",
            Self::OutOfRange { .. } => "flash access out of range",
        }
    }
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

impl From<FlashError> for Error {
    fn from(e: FlashError) -> Self {
        match e {
            FlashError::Alignment { .. } => Error::FlashAlignment,
            FlashError::ZeroLength => Error::ZeroLength,
            FlashError::Timeout => Error::FlashTimeout,
            FlashError::OutOfRange { .. } => Error::FlashOutOfRange,
        }
    }
}

// ============================================================================
// Block device
// ============================================================================

/// SPI NOR chip behind a flash transport
pub struct FlashDevice<T: FlashTransport, H: PollHook = SpinHook> {
    transport: T,
    hook: H,
    policy: RetryPolicy,
    capacity: u32,
}

impl<T: FlashTransport> FlashDevice<T> {
    /// Device spinning between status polls
    pub fn new(transport: T, config: &FlashConfig) -> Self {
        Self::with_hook(transport, config, SpinHook)
    }
}

impl<T: FlashTransport, H: PollHook> FlashDevice<T, H> {
    /// Device running `hook` between status polls
    pub fn with_hook(transport: T, config: &FlashConfig, hook: H) -> Self {
        Self {
            transport,
            hook,
            policy: RetryPolicy::new(config.status_poll_budget),
            capacity: config.chip_capacity,
        }
    }

    /// Access the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Addressable size in bytes
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Bring the chip out of continuous read mode
    pub fn init(&mut self) {
        self.transport.send(&opcode::RESET_CONTINUOUS_READ, &[]);
    }

    /// Manufacturer and device id
    pub fn read_id(&mut self) -> (u8, u8) {
        let mut id = [0u8; 2];
        self.transport.receive(&[opcode::READ_ID, 0, 0, 0], &mut id);
        (id[0], id[1])
    }

    /// Status register 1
    pub fn read_status1(&mut self) -> u8 {
        read_status(&mut self.transport, opcode::READ_STATUS1)
    }

    /// Status register 2
    pub fn read_status2(&mut self) -> u8 {
        read_status(&mut self.transport, opcode::READ_STATUS2)
    }

    /// Check the busy bit once
    pub fn is_busy(&mut self) -> bool {
        self.read_status1() & STATUS1_BUSY != 0
    }

    /// Write both status registers and wait for completion
    pub fn write_status(&mut self, status1: u8, status2: u8) -> Result<(), FlashError> {
        self.write_enable();
        self.transport
            .send(&[opcode::WRITE_STATUS, status1, status2], &[]);
        self.check_status().map(|_| ())
    }

    /// Poll until the busy bit clears
    ///
    /// Returns the number of status reads it took.
    pub fn check_status(&mut self) -> Result<u32, FlashError> {
        let Self {
            transport,
            hook,
            policy,
            ..
        } = self;
        policy
            .poll(hook, || {
                read_status(transport, opcode::READ_STATUS1) & STATUS1_BUSY == 0
            })
            .map_err(|_| FlashError::Timeout)
    }

    /// Set the QE bit unless already set
    pub fn enable_quad_mode(&mut self) -> Result<(), FlashError> {
        let status2 = self.read_status2();
        if status2 & STATUS2_QE == 0 {
            let status1 = self.read_status1();
            self.write_status(status1, status2 | STATUS2_QE)?;
        }
        self.check_status().map(|_| ())
    }

    /// Clear the QE bit unless already clear
    pub fn disable_quad_mode(&mut self) -> Result<(), FlashError> {
        let status2 = self.read_status2();
        if status2 & STATUS2_QE != 0 {
            let status1 = self.read_status1();
            self.write_status(status1, status2 & !STATUS2_QE)?;
        }
        self.check_status().map(|_| ())
    }

    /// Clear the block-protect bits, keeping QE
    pub fn disable_protect(&mut self) -> Result<(), FlashError> {
        let status2 = self.read_status2();
        self.write_status(0x00, status2 & STATUS2_KEEP_ON_UNPROTECT)
    }

    /// Read `buffer.len()` bytes at `address`
    pub fn read(
        &mut self,
        address: u32,
        buffer: &mut [u8],
        dialect: Dialect,
    ) -> Result<(), FlashError> {
        self.check_range(address, buffer.len())?;
        let mut at = address;
        for chunk in buffer.chunks_mut(SPI_FIFO_DEPTH) {
            self.read_chunk(at, chunk, dialect);
            at += chunk.len() as u32;
        }
        Ok(())
    }

    /// Program `data` at `address`
    ///
    /// The target range must be erased. Quad programming needs QE set.
    pub fn write(
        &mut self,
        address: u32,
        data: &[u8],
        mode: ProgramMode,
    ) -> Result<(), FlashError> {
        self.check_range(address, data.len())?;
        let mut at = address;
        let mut rest = data;
        while !rest.is_empty() {
            let page_room = FLASH_PAGE_SIZE - (at as usize % FLASH_PAGE_SIZE);
            let (page, tail) = rest.split_at(rest.len().min(page_room));
            for chunk in page.chunks(SPI_FIFO_DEPTH) {
                self.program_chunk(at, chunk, mode)?;
                at += chunk.len() as u32;
            }
            rest = tail;
        }
        Ok(())
    }

    /// Erase whole sectors covering `[address, address + length)`
    ///
    /// Clears block protection first. Returns the number of sectors erased.
    pub fn erase_range(&mut self, address: u32, length: usize) -> Result<u32, FlashError> {
        if address as usize % FLASH_SECTOR_SIZE != 0 {
            return Err(FlashError::Alignment { address });
        }
        if length == 0 {
            return Err(FlashError::ZeroLength);
        }
        let sectors = length.div_ceil(FLASH_SECTOR_SIZE);
        self.check_range(address, sectors * FLASH_SECTOR_SIZE)?;

        self.disable_protect()?;
        let mut at = address;
        for _ in 0..sectors {
            self.erase_sector(at)?;
            at += FLASH_SECTOR_SIZE as u32;
        }
        Ok(sectors as u32)
    }

    /// Erase the 4 KiB sector containing `address`
    pub fn erase_sector(&mut self, address: u32) -> Result<(), FlashError> {
        self.erase(opcode::SECTOR_ERASE, address)
    }

    /// Erase the 32 KiB block containing `address`
    pub fn erase_block_32k(&mut self, address: u32) -> Result<(), FlashError> {
        self.erase(opcode::BLOCK_32K_ERASE, address)
    }

    /// Erase the 64 KiB block containing `address`
    pub fn erase_block_64k(&mut self, address: u32) -> Result<(), FlashError> {
        self.erase(opcode::BLOCK_64K_ERASE, address)
    }

    /// Erase the whole chip
    pub fn erase_chip(&mut self) -> Result<(), FlashError> {
        self.write_enable();
        self.transport.send(&[opcode::CHIP_ERASE], &[]);
        self.check_status().map(|_| ())
    }

    fn erase(&mut self, op: u8, address: u32) -> Result<(), FlashError> {
        self.check_range(address, 1)?;
        let [_, a2, a1, a0] = address.to_be_bytes();
        self.write_enable();
        self.transport.send(&[op, a2, a1, a0], &[]);
        self.check_status().map(|_| ())
    }

    fn write_enable(&mut self) {
        self.transport.send(&[opcode::WRITE_ENABLE], &[]);
    }

    fn check_range(&self, address: u32, len: usize) -> Result<(), FlashError> {
        let end = u64::from(address) + len as u64;
        if end > u64::from(self.capacity) {
            return Err(FlashError::OutOfRange { address, len });
        }
        Ok(())
    }

    fn read_chunk(&mut self, address: u32, chunk: &mut [u8], dialect: Dialect) {
        let [_, a2, a1, a0] = address.to_be_bytes();
        let t = &mut self.transport;
        match dialect {
            Dialect::Standard => t.receive(&[opcode::READ, a2, a1, a0], chunk),
            Dialect::Fast => t.receive(&[opcode::FAST_READ, a2, a1, a0, 0xFF], chunk),
            Dialect::DualOutput => t.receive_enhanced(
                &FRAME_DUAL_OUTPUT,
                &[u32::from(opcode::READ_DUAL_OUTPUT), address],
                chunk,
            ),
            // Address shifted up to leave room for the mode byte
            Dialect::DualIo => t.receive_enhanced(
                &FRAME_DUAL_IO,
                &[u32::from(opcode::READ_DUAL_IO), address << 8],
                chunk,
            ),
            Dialect::QuadOutput => t.receive_enhanced(
                &FRAME_QUAD_OUTPUT,
                &[u32::from(opcode::READ_QUAD_OUTPUT), address],
                chunk,
            ),
            Dialect::QuadIo => t.receive_enhanced(
                &FRAME_QUAD_IO,
                &[u32::from(opcode::READ_QUAD_IO), address << 8],
                chunk,
            ),
        }
    }

    fn program_chunk(
        &mut self,
        address: u32,
        chunk: &[u8],
        mode: ProgramMode,
    ) -> Result<(), FlashError> {
        self.write_enable();
        match mode {
            ProgramMode::Standard => {
                let [_, a2, a1, a0] = address.to_be_bytes();
                self.transport
                    .send(&[opcode::PAGE_PROGRAM, a2, a1, a0], chunk);
            }
            ProgramMode::Quad => self.transport.send_enhanced(
                &FRAME_QUAD_PROGRAM,
                &[u32::from(opcode::QUAD_PAGE_PROGRAM), address],
                chunk,
            ),
        }
        self.check_status().map(|_| ())
    }
}

fn read_status<T: FlashTransport>(transport: &mut T, op: u8) -> u8 {
    let mut status = [0u8; 1];
    transport.receive(&[op], &mut status);
    status[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_common::constants::FLASH_STATUS_POLL_BUDGET;
    use mx_hal::sim::{EraseKind, SimFlash};

    const SIZE: usize = 64 * 1024;

    fn config(budget: u32) -> FlashConfig {
        FlashConfig {
            status_poll_budget: budget,
            chip_capacity: SIZE as u32,
            ..FlashConfig::DEFAULT
        }
    }

    fn device() -> FlashDevice<SimFlash> {
        FlashDevice::new(SimFlash::new(SIZE), &config(FLASH_STATUS_POLL_BUDGET))
    }

    #[test]
    fn test_every_dialect_reads_the_same_bytes() {
        let pattern: std::vec::Vec<u8> = (0..100u8).collect();
        let mut flash = device();
        flash.transport_mut().load(0x1F0, &pattern);
        flash.enable_quad_mode().unwrap();

        for dialect in Dialect::ALL {
            let mut buf = [0u8; 100];
            flash.read(0x1F0, &mut buf, dialect).unwrap();
            assert_eq!(&buf[..], &pattern[..], "dialect {dialect}");
        }
        assert!(flash.transport().stats().max_transfer <= SPI_FIFO_DEPTH);
    }

    #[test]
    fn test_write_splits_at_pages_and_fifo() {
        let data = [0x42u8; 300];
        let mut flash = device();
        // Starts 16 bytes before a page boundary
        flash.write(0xF0, &data, ProgramMode::Standard).unwrap();

        assert_eq!(flash.transport().contents(0xF0, 300), &data[..]);
        let stats = flash.transport().stats();
        assert!(stats.max_transfer <= SPI_FIFO_DEPTH);
        // 16 + 256 / 32 + 28 = 1 + 8 + 1
        assert_eq!(stats.programs, 10);
        assert_eq!(stats.rejected, 0);
    }

    #[test]
    fn test_quad_program() {
        let data = [0x11u8; 64];
        let mut flash = device();
        flash.enable_quad_mode().unwrap();
        flash.write(0x100, &data, ProgramMode::Quad).unwrap();
        assert_eq!(flash.transport().contents(0x100, 64), &data[..]);
        assert_eq!(flash.transport().stats().quad_programs, 2);
    }

    #[test]
    fn test_erase_range_alignment() {
        let mut flash = device();
        assert_eq!(
            flash.erase_range(4097, 4096),
            Err(FlashError::Alignment { address: 4097 })
        );
        assert_eq!(flash.erase_range(4096, 0), Err(FlashError::ZeroLength));
        assert!(flash.transport().stats().erases.is_empty());
        assert_eq!(flash.erase_range(4096, 4096), Ok(1));
    }

    #[test]
    fn test_erase_range_rounds_up_to_sectors() {
        let mut flash = device();
        flash.transport_mut().load(0, &[0u8; 3 * 4096]);
        assert_eq!(flash.erase_range(0, 4097), Ok(2));
        assert!(flash.transport().contents(0, 8192).iter().all(|&b| b == 0xFF));
        assert_eq!(flash.transport().contents(8192, 1), &[0x00]);
        let erases = &flash.transport().stats().erases;
        assert_eq!(erases[..], [(EraseKind::Sector, 0), (EraseKind::Sector, 4096)]);
    }

    #[test]
    fn test_block_erases_cover_their_block() {
        let mut flash = device();
        flash.transport_mut().load(0, &[0u8; SIZE]);

        flash.erase_block_32k(0x9000).unwrap();
        assert!(flash.transport().contents(0x8000, 0x8000).iter().all(|&b| b == 0xFF));
        assert_eq!(flash.transport().contents(0x7FFF, 1), &[0x00]);

        flash.erase_block_64k(0x0100).unwrap();
        assert!(flash.transport().contents(0, SIZE).iter().all(|&b| b == 0xFF));

        let erases = &flash.transport().stats().erases;
        assert_eq!(
            erases[..],
            [(EraseKind::Block32K, 0x9000), (EraseKind::Block64K, 0x0100)]
        );
        assert!(flash.erase_block_64k(SIZE as u32).is_err());
    }

    #[test]
    fn test_chip_erase() {
        let mut flash = device();
        flash.transport_mut().load(0, &[0x5Au8; 64]);
        flash.transport_mut().load(SIZE as u32 - 64, &[0x5Au8; 64]);
        flash.transport_mut().set_busy_reads(5);

        flash.erase_chip().unwrap();
        assert!(flash.transport().contents(0, SIZE).iter().all(|&b| b == 0xFF));
        assert_eq!(flash.transport().stats().erases[..], [(EraseKind::Chip, 0)]);
        assert_eq!(flash.transport().stats().busy_polls, 5);
    }

    #[test]
    fn test_erase_range_clears_protection() {
        let mut flash = device();
        flash.transport_mut().load(0, &[0u8; 16]);
        flash.transport_mut().protect_all();
        flash.erase_range(0, 16).unwrap();
        assert_eq!(flash.transport().contents(0, 16), &[0xFF; 16]);
    }

    #[test]
    fn test_unprotect_keeps_quad_enable() {
        let mut flash = device();
        flash.enable_quad_mode().unwrap();
        flash.transport_mut().protect_all();
        flash.disable_protect().unwrap();
        assert_eq!(flash.read_status2() & STATUS2_QE, STATUS2_QE);
        assert_eq!(flash.read_status1() & 0x1C, 0);
    }

    #[test]
    fn test_quad_mode_toggles() {
        let mut flash = device();
        flash.enable_quad_mode().unwrap();
        flash.enable_quad_mode().unwrap();
        assert_eq!(flash.transport().stats().status_writes, 1);
        flash.disable_quad_mode().unwrap();
        assert_eq!(flash.read_status2() & STATUS2_QE, 0);
    }

    #[test]
    fn test_stuck_busy_times_out_within_budget() {
        let mut probes = 0u32;
        let hook = |_: u32| probes += 1;
        let mut flash = FlashDevice::with_hook(SimFlash::new(SIZE), &config(8), hook);
        flash.transport_mut().set_stuck_busy(true);
        assert_eq!(flash.check_status(), Err(FlashError::Timeout));
        drop(flash);
        assert_eq!(probes, 8);
    }

    #[test]
    fn test_check_status_counts_reads() {
        let mut flash = device();
        flash.transport_mut().set_busy_reads(3);
        flash.erase_sector(0).unwrap();
        assert_eq!(flash.transport().stats().busy_polls, 3);
    }

    #[test]
    fn test_out_of_range() {
        let mut flash = device();
        let mut buf = [0u8; 8];
        assert_eq!(
            flash.read(SIZE as u32 - 4, &mut buf, Dialect::Standard),
            Err(FlashError::OutOfRange {
                address: SIZE as u32 - 4,
                len: 8
            })
        );
        assert!(flash.erase_range(SIZE as u32 - 4096, 4097).is_err());
    }

    #[test]
    fn test_read_id() {
        let mut flash = device();
        flash.init();
        assert_eq!(flash.read_id(), (0xEF, 0x17));
    }

    #[test]
    fn test_error_codes_match_common() {
        for e in [
            FlashError::Timeout,
            FlashError::Alignment { address: 1 },
            FlashError::ZeroLength,
            FlashError::OutOfRange { address: 0, len: 1 },
        ] {
            assert_eq!(e.code(), Error::from(e).code());
        }
    }
}
