// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! MAIX Loader Entry Point
//!
//! The SDK start-up code runs `main` on core 0 and keeps core 1 in its
//! start-up loop until `register_core1` hands it an entry.
//!
//! # Boot Flow
//!
//! 1. Console up, core 1 started into [`core1_entry`]
//! 2. Open the flash controller for the configured bus
//! 3. Validate the backup and primary slots, repairing whichever is broken
//! 4. Release core 1 and wait for it at the rendezvous
//! 5. Jump to the load address
//!
//! A failed boot reports through `sys_exit`; core 1 is never released.

#![no_std]
#![no_main]

use core::ffi::c_void;

use mx_boot::{core1_main, FlashDevice, HandoffChannel, Sequencer, Validator};
use mx_common::config::BootConfig;
use mx_common::constants::{exit_reason, BOOT_HART, SECONDARY_HART};
use mx_common::log::Logger;
use mx_common::log_error;
use mx_hal::k210::{sdk, DwSsi, OtpKeyPath, SdkAes, SdkSha256, Uarths};
use mx_hal::riscv::{Clint, Hart};
use mx_hal::ConsoleSink;

const CONFIG: BootConfig = BootConfig::DEFAULT;

static CHANNEL: HandoffChannel = HandoffChannel::new();

// =============================================================================
// Core 0
// =============================================================================

/// Loader entry point, called by the SDK on core 0
#[no_mangle]
pub extern "C" fn main() -> i32 {
    let mut console = Uarths::new();
    console.init();

    let Some(port) = CHANNEL.take_core0() else {
        sdk::exit(exit_reason::ABNORMAL)
    };
    sdk::start_core1(core1_entry);

    let flash = FlashDevice::new(DwSsi::open(CONFIG.flash.bus), &CONFIG.flash);
    let validator = Validator::new(flash, SdkSha256, SdkAes::new(), OtpKeyPath, &CONFIG.flash);
    let mut sequencer = Sequencer::new(CONFIG, validator, ConsoleSink::new(console));

    // SAFETY: the linker script reserves this region for the loaded image
    // and nothing else in the loader touches it.
    let scratch = unsafe {
        core::slice::from_raw_parts_mut(CONFIG.load_address as *mut u8, CONFIG.scratch_size())
    };

    let mut clint = Clint::for_hart(BOOT_HART);
    let mut delay = Clint::for_hart(BOOT_HART);
    match sequencer.boot(port, &mut clint, &mut delay, scratch) {
        Ok(launch) => {
            // SAFETY: running on core 0; the only handle created for it.
            let mut hart = unsafe { Hart::<BOOT_HART>::steal() };
            sequencer.launch(launch, &mut hart, &mut delay)
        }
        Err(_) => sdk::exit(exit_reason::ABNORMAL),
    }
}

// =============================================================================
// Core 1
// =============================================================================

/// Core 1 entry, registered with the SDK from core 0
extern "C" fn core1_entry(_ctx: *mut c_void) -> i32 {
    let mut logger = Logger::new(ConsoleSink::new(Uarths::new()));
    logger.set_min_level(CONFIG.log_level);

    let Some(port) = CHANNEL.take_core1() else {
        log_error!(logger, "handoff", "core 1 started twice");
        loop {
            core::hint::spin_loop();
        }
    };

    let mut ipi = Clint::for_hart(SECONDARY_HART);
    let mut delay = Clint::for_hart(SECONDARY_HART);
    // SAFETY: running on core 1; the only handle created for it.
    let mut hart = unsafe { Hart::<SECONDARY_HART>::steal() };
    core1_main(port, &mut ipi, &mut hart, &mut delay, &mut logger, &CONFIG)
}

/// Panic handler
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    sdk::exit(exit_reason::ABNORMAL)
}
