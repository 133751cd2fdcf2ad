// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! HAL error types
//!
//! Only the digest/cipher engines report errors; a flash transport that
//! misbehaves just never completes.

use core::fmt;

/// Engine error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// `process` before a successful `init`
    NotInitialized,
    /// Key, IV or data length the engine cannot take
    InvalidParameter,
    /// Mode the engine does not implement
    NotSupported,
    /// Engine failed or was fed more data than announced
    EngineFault,
}

impl HalError {
    /// Get error code
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::NotInitialized => 0x0401,
            Self::InvalidParameter => 0x0402,
            Self::NotSupported => 0x0403,
            Self::EngineFault => 0x0404,
        }
    }

    /// Get error description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::NotInitialized => "engine used before init",
            Self::InvalidParameter => "engine parameter rejected",
            Self::NotSupported => "engine mode not supported",
            Self::EngineFault => "engine fault",
        }
    }
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

impl From<HalError> for mx_common::Error {
    fn from(e: HalError) -> Self {
        match e {
            HalError::NotInitialized => Self::HardwareInitFailed,
            HalError::InvalidParameter => Self::InvalidParameter,
            HalError::NotSupported => Self::NotSupported,
            HalError::EngineFault => Self::CryptoFailure,
        }
    }
}

/// HAL Result type
pub type HalResult<T> = Result<T, HalError>;
