// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! System-wide constants for the MAIX loader
//!
//! Image layout, SPI NOR geometry and the exit-reason table shared with the
//! bare-metal harness.

// =============================================================================
// Image Layout Constants
// =============================================================================

/// Cipher flag (1 byte) plus little-endian payload length (4 bytes)
pub const IMAGE_HEADER_SIZE: usize = 5;

/// SHA-256 digest trailing the payload
pub const IMAGE_DIGEST_SIZE: usize = 32;

/// Bytes an image occupies beyond its payload
pub const IMAGE_OVERHEAD: usize = IMAGE_HEADER_SIZE + IMAGE_DIGEST_SIZE;

/// Bit in the cipher flag requesting AES-CBC decryption
pub const IMAGE_FLAG_CIPHER: u8 = 0x01;

/// Packed images are padded so header, payload and digest fill whole 64-byte lines
pub const IMAGE_PAD_ALIGN: usize = 64;

/// AES block size in bytes
pub const CIPHER_BLOCK_SIZE: usize = 16;

/// AES-128 key size in bytes
pub const CIPHER_KEY_SIZE: usize = 16;

/// CBC initialization vector size in bytes
pub const CIPHER_IV_SIZE: usize = 16;

// =============================================================================
// SPI NOR Geometry
// =============================================================================

/// Program page size in bytes
pub const FLASH_PAGE_SIZE: usize = 256;

/// Erase sector size in bytes
pub const FLASH_SECTOR_SIZE: usize = 4096;

/// Pages per sector
pub const FLASH_PAGES_PER_SECTOR: usize = FLASH_SECTOR_SIZE / FLASH_PAGE_SIZE;

/// 32 KiB erase block
pub const FLASH_BLOCK_32K_SIZE: usize = 32 * 1024;

/// 64 KiB erase block
pub const FLASH_BLOCK_64K_SIZE: usize = 64 * 1024;

/// Default chip size (16 MiB)
pub const FLASH_CHIP_SIZE: u32 = 16 * 1024 * 1024;

/// SPI controller FIFO depth in frames
pub const SPI_FIFO_DEPTH: usize = 32;

/// Busy-bit polls before a flash operation is declared timed out
pub const FLASH_STATUS_POLL_BUDGET: u32 = 0x00FF_FFFF;

// =============================================================================
// Multi-core Constants
// =============================================================================

/// Hart that drives flash, digest and cipher engines
pub const BOOT_HART: usize = 0;

/// Hart parked until the handoff interrupt
pub const SECONDARY_HART: usize = 1;

/// Number of harts taking part in the handoff
pub const HART_COUNT: usize = 2;

// =============================================================================
// Build Information
// =============================================================================

/// Build string printed in the banner
pub const BUILD_VERSION: &str = match option_env!("MX_BUILD_VERSION") {
    Some(version) => version,
    None => "unstable dev",
};

/// Exit reasons understood by the bare-metal harness
pub mod exit_reason {
    /// Loader finished normally
    pub const NORMAL: u32 = 0;
    /// Digest of a flash image did not match
    pub const SHA256FLASH: u32 = 24;
    /// Image larger than its slot
    pub const OVERSIZE: u32 = 233;
    /// Flash device unusable
    pub const NOFLASH: u32 = 234;
    /// Boot failed for any other reason
    pub const ABNORMAL: u32 = 255;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_overhead() {
        assert_eq!(IMAGE_OVERHEAD, 37);
    }

    #[test]
    fn test_flash_geometry_consistent() {
        assert_eq!(FLASH_PAGES_PER_SECTOR, 16);
        assert_eq!(FLASH_SECTOR_SIZE % FLASH_PAGE_SIZE, 0);
        assert_eq!(FLASH_BLOCK_64K_SIZE % FLASH_SECTOR_SIZE, 0);
        assert_eq!(FLASH_CHIP_SIZE as usize % FLASH_BLOCK_64K_SIZE, 0);
    }
}
