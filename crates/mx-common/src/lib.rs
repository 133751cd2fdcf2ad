// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! MAIX Loader Common Library
//!
//! This crate provides the error type, configuration structures, logging and
//! vocabulary types shared by the HAL, crypto and boot crates.
//!
//! # Features
//!
//! - `stage1`: Select the first-stage loader flash map
//! - `debug`: Debug-level console output
//!
//! No heap allocations are performed - all buffers use fixed-size arrays or
//! heapless collections.

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod types;
pub mod errors;
pub mod config;
pub mod log;
pub mod constants;

// Re-export commonly used items
pub use errors::{Error, Result};
pub use types::*;
pub use config::{BootConfig, FlashConfig, FlashMap, FlashSlot, HandoffConfig};
pub use log::{LogLevel, LogSink, Logger};
