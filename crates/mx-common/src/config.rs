// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Loader configuration
//!
//! All configuration is compile-time. The flash map, the dialects used to
//! talk to flash and the handoff delays are fixed per build; the `stage1`
//! and `debug` features select between the shipped variants.

use crate::constants::{
    FLASH_CHIP_SIZE, FLASH_SECTOR_SIZE, FLASH_STATUS_POLL_BUDGET, IMAGE_OVERHEAD,
};
use crate::errors::{Error, Result};
use crate::log::LogLevel;
use crate::types::{Dialect, FlashBus, LoaderStage, ProgramMode, SlotId};

/// A fixed flash region holding one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashSlot {
    /// Absolute flash offset of the image header
    pub base: u32,
    /// Bytes reserved for header, payload and digest
    pub capacity: u32,
}

impl FlashSlot {
    /// Create a slot
    #[must_use]
    pub const fn new(base: u32, capacity: u32) -> Self {
        Self { base, capacity }
    }

    /// First offset past the slot
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.base.saturating_add(self.capacity)
    }

    /// Largest payload length the slot can hold
    #[must_use]
    pub const fn max_payload_len(&self) -> u32 {
        self.capacity.saturating_sub(IMAGE_OVERHEAD as u32)
    }

    /// Check if `[address, address + len)` lies inside the slot
    #[must_use]
    pub const fn contains(&self, address: u32, len: u32) -> bool {
        match address.checked_add(len) {
            Some(end) => address >= self.base && end <= self.end(),
            None => false,
        }
    }

    /// Check if the slot starts and ends on a sector boundary
    #[must_use]
    pub const fn is_sector_aligned(&self) -> bool {
        self.base as usize % FLASH_SECTOR_SIZE == 0
            && self.capacity as usize % FLASH_SECTOR_SIZE == 0
    }

    /// Check if two slots share any byte
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.base < other.end() && other.base < self.end()
    }
}

/// The two redundant image slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashMap {
    /// Slot booted from
    pub primary: FlashSlot,
    /// Slot used to repair the primary
    pub backup: FlashSlot,
}

impl FlashMap {
    /// First-stage loader: the stage-2 loader lives at 64K (APP) and 128K (BAK)
    pub const STAGE1: Self = Self {
        primary: FlashSlot::new(64 * 1024, 64 * 1024),
        backup: FlashSlot::new(2 * 64 * 1024, 64 * 1024),
    };

    /// Second-stage loader: the application lives at 192K (APP) and 512K (BAK)
    pub const STAGE2: Self = Self {
        primary: FlashSlot::new(3 * 64 * 1024, 320 * 1024),
        backup: FlashSlot::new((3 * 64 + 320) * 1024, 320 * 1024),
    };

    /// Create a custom map
    #[must_use]
    pub const fn new(primary: FlashSlot, backup: FlashSlot) -> Self {
        Self { primary, backup }
    }

    /// Map used by a loader stage
    #[must_use]
    pub const fn for_stage(stage: LoaderStage) -> Self {
        match stage {
            LoaderStage::Stage1 => Self::STAGE1,
            LoaderStage::Stage2 => Self::STAGE2,
        }
    }

    /// Look up a slot
    #[must_use]
    pub const fn slot(&self, id: SlotId) -> FlashSlot {
        match id {
            SlotId::Primary => self.primary,
            SlotId::Backup => self.backup,
        }
    }

    /// Reject maps the loader could not repair on a `chip_capacity` byte chip
    ///
    /// Slots must be whole sectors, lie on the chip, not overlap, and hold
    /// at least an empty image. Repair erases sector by sector, so a slot
    /// sharing a sector with anything else would lose that data.
    pub fn check(&self, chip_capacity: u32) -> Result<()> {
        for slot in [self.primary, self.backup] {
            if (slot.capacity as usize) < IMAGE_OVERHEAD {
                return Err(Error::InvalidParameter);
            }
            if !slot.is_sector_aligned() {
                return Err(Error::FlashAlignment);
            }
            match slot.base.checked_add(slot.capacity) {
                Some(end) if end <= chip_capacity => {}
                _ => return Err(Error::FlashOutOfRange),
            }
        }
        if self.primary.overlaps(&self.backup) {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

/// Flash access configuration
#[derive(Debug, Clone, Copy)]
pub struct FlashConfig {
    /// Controller wired to the boot flash
    pub bus: FlashBus,
    /// Dialect for image reads
    pub read_dialect: Dialect,
    /// Program opcode family for slot repair
    pub program_mode: ProgramMode,
    /// Busy-bit polls before an erase/program is declared timed out
    pub status_poll_budget: u32,
    /// Addressable chip size
    pub chip_capacity: u32,
}

impl FlashConfig {
    /// Internal flash, quad I/O reads and quad programming
    pub const DEFAULT: Self = Self {
        bus: FlashBus::Internal,
        read_dialect: Dialect::QuadIo,
        program_mode: ProgramMode::Quad,
        status_poll_budget: FLASH_STATUS_POLL_BUDGET,
        chip_capacity: FLASH_CHIP_SIZE,
    };
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Delays around the dual-core handoff
#[derive(Debug, Clone, Copy)]
pub struct HandoffConfig {
    /// Wait after waking core 1 before verification starts
    pub core1_settle_ms: u32,
    /// Wait on core 1 after reaching the rendezvous
    pub core1_jump_delay_ms: u32,
    /// Wait for console output to drain before jumping
    pub print_settle_ms: u32,
}

impl HandoffConfig {
    /// Default delays
    pub const DEFAULT: Self = Self {
        core1_settle_ms: 20,
        core1_jump_delay_ms: 10,
        print_settle_ms: 100,
    };
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Top-level loader configuration
#[derive(Debug, Clone, Copy)]
pub struct BootConfig {
    /// Which loader stage this build is
    pub stage: LoaderStage,
    /// Slot locations
    pub flash_map: FlashMap,
    /// Flash access
    pub flash: FlashConfig,
    /// Handoff delays
    pub handoff: HandoffConfig,
    /// Minimum level forwarded to the console
    pub log_level: LogLevel,
    /// RAM address images are loaded to and entered at (must match the linker script)
    pub load_address: usize,
}

impl BootConfig {
    /// Configuration for this build
    pub const DEFAULT: Self = Self::for_stage(LoaderStage::current());

    /// Configuration for a given stage
    #[must_use]
    pub const fn for_stage(stage: LoaderStage) -> Self {
        Self {
            stage,
            flash_map: FlashMap::for_stage(stage),
            flash: FlashConfig::DEFAULT,
            handoff: HandoffConfig::DEFAULT,
            log_level: if cfg!(feature = "debug") {
                LogLevel::Debug
            } else {
                LogLevel::Info
            },
            load_address: 0x8000_0000,
        }
    }

    /// Scratch buffer size needed to load any image from this map
    #[must_use]
    pub const fn scratch_size(&self) -> usize {
        let primary = self.flash_map.primary.max_payload_len();
        let backup = self.flash_map.backup.max_payload_len();
        if primary > backup {
            primary as usize
        } else {
            backup as usize
        }
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage2_map() {
        let map = FlashMap::STAGE2;
        assert_eq!(map.primary.base, 0x0003_0000);
        assert_eq!(map.backup.base, 0x0008_0000);
        assert_eq!(map.primary.capacity, 320 * 1024);
        assert_eq!(map.primary.end(), map.backup.base);
        assert!(map.check(FLASH_CHIP_SIZE).is_ok());
    }

    #[test]
    fn test_stage1_map() {
        let map = FlashMap::STAGE1;
        assert_eq!(map.primary.base, 0x0001_0000);
        assert_eq!(map.backup.base, 0x0002_0000);
        assert!(map.check(FLASH_CHIP_SIZE).is_ok());
    }

    #[test]
    fn test_overlapping_map_rejected() {
        let map = FlashMap::new(FlashSlot::new(0, 8192), FlashSlot::new(4096, 8192));
        assert_eq!(map.check(FLASH_CHIP_SIZE), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_tiny_slot_rejected() {
        let map = FlashMap::new(FlashSlot::new(0, 36), FlashSlot::new(4096, 4096));
        assert_eq!(map.check(FLASH_CHIP_SIZE), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_unaligned_slot_rejected() {
        let map = FlashMap::new(FlashSlot::new(0, 0x1000), FlashSlot::new(0x1100, 0x1000));
        assert_eq!(map.check(FLASH_CHIP_SIZE), Err(Error::FlashAlignment));

        let ragged = FlashMap::new(FlashSlot::new(0, 0x1800), FlashSlot::new(0x2000, 0x1000));
        assert_eq!(ragged.check(FLASH_CHIP_SIZE), Err(Error::FlashAlignment));
    }

    #[test]
    fn test_slot_past_chip_rejected() {
        let map = FlashMap::new(FlashSlot::new(0, 0x2000), FlashSlot::new(0x2000, 0x2000));
        assert!(map.check(0x4000).is_ok());
        assert_eq!(map.check(0x3000), Err(Error::FlashOutOfRange));

        let wrapping =
            FlashMap::new(FlashSlot::new(0, 0x1000), FlashSlot::new(0xFFFF_F000, 0x2000));
        assert_eq!(wrapping.check(u32::MAX), Err(Error::FlashOutOfRange));
    }

    #[test]
    fn test_slot_bounds() {
        let slot = FlashSlot::new(4096, 4096);
        assert_eq!(slot.max_payload_len(), 4096 - 37);
        assert!(slot.contains(4096, 4096));
        assert!(!slot.contains(4096, 4097));
        assert!(!slot.contains(4095, 1));
        assert!(!slot.contains(u32::MAX, 2));
        assert_eq!(FlashSlot::new(0, 10).max_payload_len(), 0);
    }

    #[test]
    fn test_scratch_size_covers_both_slots() {
        let config = BootConfig::for_stage(LoaderStage::Stage2);
        assert_eq!(config.scratch_size(), 320 * 1024 - 37);
    }
}
