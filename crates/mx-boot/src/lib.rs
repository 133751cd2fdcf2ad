// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! MAIX Loader Boot Library
//!
//! This crate provides the boot flow of the dual-core A/B loader:
//!
//! - **Flash**: SPI NOR block device over a [`mx_hal::FlashTransport`]
//! - **Image**: record layout and packer
//! - **Verify**: digest check and optional decryption into RAM
//! - **Redundancy**: slot comparison and repair
//! - **Handoff**: core 1 parking and the final jump
//! - **Sequencer**: core 0's state machine tying the above together

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(test)]
extern crate std;

pub mod retry;
pub mod flash;
pub mod image;
pub mod verify;
pub mod redundancy;
pub mod handoff;
pub mod sequencer;

pub use flash::{FlashDevice, FlashError};
pub use handoff::{core1_main, Core0Port, Core1Port, HandoffChannel, Launch};
pub use image::ImageHeader;
pub use redundancy::{Reconciliation, RepairDirection};
pub use retry::{PollHook, RetryPolicy, SpinHook};
pub use sequencer::{BootState, Sequencer};
pub use verify::{LoadedImage, Outcome, Validator, VerifyError};
