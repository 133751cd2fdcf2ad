// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Kendryte K210 Hardware Abstraction Layer
//!
//! Drivers for the dual-core RV64 K210 as the loader uses it:
//!
//! - DesignWare SSI flash transport (SPI0 external, SPI3 internal)
//! - SHA-256 and AES accelerators and the OTP key path (vendor SDK)
//! - UARTHS console

pub mod sdk;
pub mod spi;
pub mod uarths;

// Re-export main types
pub use sdk::{OtpKeyPath, SdkAes, SdkSha256, SdkSha256Context};
pub use spi::{DwSsi, SsiInstance};
pub use uarths::Uarths;
