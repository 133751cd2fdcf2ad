// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! MAIX Loader software crypto engines
//!
//! Software implementations of the HAL digest and cipher engine interfaces:
//!
//! - SHA-256 (single or double hash) over `sha2`
//! - AES-128 ECB/CBC over `aes`, optionally with a caller-invisible key to
//!   model the OTP key path
//!
//! They serve as reference engines for host testing and as the fallback on
//! parts without the K210 accelerators.
//!
//! # Security Requirements
//!
//! - Zeroize key and chaining material after use
//! - Never log or expose key material

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod secret;
pub mod hash;
pub mod cipher;

pub use cipher::AesEngine;
pub use error::{CryptoError, CryptoResult};
pub use hash::{Sha256Context, Sha256Engine};
