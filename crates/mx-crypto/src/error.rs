// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Cryptographic error types

use core::fmt;
use mx_hal::HalError;

/// Error type for the software digest and cipher engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// Key is not 16 bytes
    InvalidKeyLength,
    /// IV is not 16 bytes
    InvalidIvLength,
    /// `process` called before `init`
    NotInitialized,
    /// Chaining mode not implemented by this engine
    UnsupportedMode,
    /// `process` called with a different mode than `init`
    ModeMismatch,
    /// More blocks processed than declared at `init`
    LengthExceeded,
}

impl CryptoError {
    /// Get error code for logging/debugging
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::InvalidKeyLength => 0x0C01,
            Self::InvalidIvLength => 0x0C02,
            Self::NotInitialized => 0x0C03,
            Self::UnsupportedMode => 0x0C04,
            Self::ModeMismatch => 0x0C05,
            Self::LengthExceeded => 0x0C06,
        }
    }

    /// Get error description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidKeyLength => "invalid key length",
            Self::InvalidIvLength => "invalid IV length",
            Self::NotInitialized => "cipher not initialized",
            Self::UnsupportedMode => "unsupported cipher mode",
            Self::ModeMismatch => "cipher mode differs from init",
            Self::LengthExceeded => "more data than declared",
        }
    }
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

impl From<CryptoError> for HalError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidKeyLength
            | CryptoError::InvalidIvLength
            | CryptoError::ModeMismatch => Self::InvalidParameter,
            CryptoError::NotInitialized => Self::NotInitialized,
            CryptoError::UnsupportedMode => Self::NotSupported,
            CryptoError::LengthExceeded => Self::EngineFault,
        }
    }
}

impl From<CryptoError> for mx_common::Error {
    fn from(e: CryptoError) -> Self {
        HalError::from(e).into()
    }
}

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;
