// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Hardware Abstraction Layer for the MAIX loader
//!
//! This crate provides the interfaces the loader is written against and their
//! implementations:
//!
//! - **RISC-V**: CLINT software interrupts and timer, per-hart control
//! - **K210**: DesignWare SSI flash transport, SDK accelerators, UARTHS
//! - **Simulation**: host test doubles (`sim` feature, requires std)
//!
//! # Architecture
//!
//! The HAL is structured in layers:
//!
//! 1. **Traits**: Platform-agnostic interfaces (`traits` module)
//! 2. **Drivers**: Platform-specific implementations
//! 3. **Console sink**: log entries to a character console

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(any(test, feature = "sim"))]
extern crate std;

pub mod traits;
pub mod error;
pub mod console;

#[cfg(feature = "riscv")]
pub mod riscv;

#[cfg(feature = "k210")]
pub mod k210;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

// Re-export main traits
pub use traits::*;
pub use error::{HalError, HalResult};
pub use console::ConsoleSink;
