// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Error types for the MAIX loader
//!
//! This module defines the unified error type every layer converts into.
//! Only the boot sequencer decides whether an error is fatal; everything
//! below it reports errors as values.

use core::fmt;

use crate::constants::exit_reason;

/// Result type alias for loader operations
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the MAIX loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Image Errors (0x01xx)
    // =========================================================================
    /// Declared payload length does not fit in the slot
    Oversize,
    /// Computed digest differs from the digest stored after the payload
    DigestMismatch,
    /// Encrypted payload length is not a whole number of cipher blocks
    CipherLength,
    /// Neither slot holds an image that validates
    NoValidImage,

    // =========================================================================
    // Flash Errors (0x02xx)
    // =========================================================================
    /// Busy bit did not clear within the retry budget
    FlashTimeout,
    /// Erase address is not sector aligned
    FlashAlignment,
    /// Erase requested with zero length
    ZeroLength,
    /// Access falls outside the flash chip
    FlashOutOfRange,

    // =========================================================================
    // Hardware Errors (0x03xx)
    // =========================================================================
    /// Hardware initialization failed
    HardwareInitFailed,
    /// Digest or cipher engine reported a failure
    CryptoFailure,
    /// Inter-core handoff port already taken
    HandoffUnavailable,

    // =========================================================================
    // General Errors (0xFFxx)
    // =========================================================================
    /// Caller-supplied buffer is too small
    BufferTooSmall,
    /// Invalid parameter
    InvalidParameter,
    /// Operation not valid in the current state
    InvalidState,
    /// Operation not supported by this implementation
    NotSupported,
}

impl Error {
    /// Get error code for logging
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::Oversize => 0x0101,
            Self::DigestMismatch => 0x0102,
            Self::CipherLength => 0x0103,
            Self::NoValidImage => 0x0104,

            Self::FlashTimeout => 0x0201,
            Self::FlashAlignment => 0x0202,
            Self::ZeroLength => 0x0203,
            Self::FlashOutOfRange => 0x0204,

            Self::HardwareInitFailed => 0x0301,
            Self::CryptoFailure => 0x0302,
            Self::HandoffUnavailable => 0x0303,

            Self::BufferTooSmall => 0xFF01,
            Self::InvalidParameter => 0xFF02,
            Self::InvalidState => 0xFF03,
            Self::NotSupported => 0xFF04,
        }
    }

    /// Get error description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Oversize => "image larger than slot",
            Self::DigestMismatch => "image digest mismatch",
            Self::CipherLength => "encrypted payload not block aligned",
            Self::NoValidImage => "no valid image in either slot",
            Self::FlashTimeout => "flash operation timeout",
            Self::FlashAlignment => "flash offset not sector aligned",
            Self::ZeroLength => "length must be larger than 0",
            Self::FlashOutOfRange => "flash access out of range",
            Self::HardwareInitFailed => "hardware initialization failed",
            Self::CryptoFailure => "crypto engine failure",
            Self::HandoffUnavailable => "handoff port unavailable",
            Self::BufferTooSmall => "buffer too small",
            Self::InvalidParameter => "invalid parameter",
            Self::InvalidState => "invalid state",
            Self::NotSupported => "not supported",
        }
    }

    /// Exit reason reported to the bare-metal harness for this error
    #[must_use]
    pub const fn exit_reason(&self) -> u32 {
        match self {
            Self::Oversize => exit_reason::OVERSIZE,
            Self::DigestMismatch => exit_reason::SHA256FLASH,
            Self::FlashTimeout | Self::FlashOutOfRange => exit_reason::NOFLASH,
            _ => exit_reason::ABNORMAL,
        }
    }

    /// Check if this error concerns the flash device itself
    #[must_use]
    pub const fn is_flash_error(&self) -> bool {
        matches!(
            self,
            Self::FlashTimeout | Self::FlashAlignment | Self::ZeroLength | Self::FlashOutOfRange
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_grouped_by_category() {
        assert_eq!(Error::Oversize.code() >> 8, 0x01);
        assert_eq!(Error::FlashTimeout.code() >> 8, 0x02);
        assert_eq!(Error::CryptoFailure.code() >> 8, 0x03);
        assert_eq!(Error::BufferTooSmall.code() >> 8, 0xFF);
    }

    #[test]
    fn test_exit_reasons() {
        assert_eq!(Error::Oversize.exit_reason(), 233);
        assert_eq!(Error::DigestMismatch.exit_reason(), 24);
        assert_eq!(Error::NoValidImage.exit_reason(), 255);
        assert_eq!(Error::FlashTimeout.exit_reason(), 234);
    }

    #[test]
    fn test_flash_classification() {
        assert!(Error::FlashAlignment.is_flash_error());
        assert!(Error::ZeroLength.is_flash_error());
        assert!(!Error::DigestMismatch.is_flash_error());
    }
}
