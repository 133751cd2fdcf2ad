// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Dual-core handoff
//!
//! Core 0 validates the image while core 1 waits parked on its software
//! interrupt. The cores coordinate through a [`HandoffChannel`]:
//!
//! ```text
//! core 0                          core 1
//! wake_core1()  ---- wake ---->   wait_for_wake()
//!                                 park(): init, clear, enable IPI
//!               <--- armed ----   wfi until pending
//! validate, repair
//! release_core1(): IPI ------->   disable, clear, unregister
//! wait_rendezvous() <-- arrive -- arrive(), delay
//! launch                          launch
//! ```
//!
//! Each port can be taken exactly once, so at most one core plays each role.

use core::sync::atomic::{AtomicBool, Ordering};

use mx_common::config::BootConfig;
use mx_common::constants::SECONDARY_HART;
use mx_common::log::{LogSink, Logger};
use mx_common::log_info;
use mx_hal::{CoreControl, DelayInterface, InterProcessorInterrupt};

/// Flags shared by the two cores for one power cycle
#[derive(Debug)]
pub struct HandoffChannel {
    wake: AtomicBool,
    armed: AtomicBool,
    rendezvous: AtomicBool,
    core0_taken: AtomicBool,
    core1_taken: AtomicBool,
}

impl HandoffChannel {
    /// Create a channel with every flag clear
    #[must_use]
    pub const fn new() -> Self {
        Self {
            wake: AtomicBool::new(false),
            armed: AtomicBool::new(false),
            rendezvous: AtomicBool::new(false),
            core0_taken: AtomicBool::new(false),
            core1_taken: AtomicBool::new(false),
        }
    }

    /// Core 0's end, handed out once
    pub fn take_core0(&self) -> Option<Core0Port<'_>> {
        if self.core0_taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Core0Port { channel: self })
    }

    /// Core 1's end, handed out once
    pub fn take_core1(&self) -> Option<Core1Port<'_>> {
        if self.core1_taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Core1Port { channel: self })
    }
}

impl Default for HandoffChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Boot core's end of the channel
#[derive(Debug)]
pub struct Core0Port<'a> {
    channel: &'a HandoffChannel,
}

impl Core0Port<'_> {
    /// Let core 1 leave its start-up wait
    pub fn wake_core1(&self) {
        self.channel.wake.store(true, Ordering::Release);
    }

    /// Check if core 1 has its interrupt path armed
    #[must_use]
    pub fn core1_armed(&self) -> bool {
        self.channel.armed.load(Ordering::Acquire)
    }

    /// Interrupt core 1 out of its wait, once it is ready to see it
    pub fn release_core1<I: InterProcessorInterrupt>(&self, ipi: &mut I) {
        // An IPI sent before core 1 clears its pending bit would be lost
        while !self.core1_armed() {
            core::hint::spin_loop();
        }
        ipi.send(SECONDARY_HART);
    }

    /// Check if core 1 reached its jump point
    #[must_use]
    pub fn core1_arrived(&self) -> bool {
        self.channel.rendezvous.load(Ordering::Acquire)
    }

    /// Block until core 1 reached its jump point
    pub fn wait_rendezvous(&self) {
        while !self.core1_arrived() {
            core::hint::spin_loop();
        }
    }
}

/// Secondary core's end of the channel
#[derive(Debug)]
pub struct Core1Port<'a> {
    channel: &'a HandoffChannel,
}

impl Core1Port<'_> {
    /// Block until core 0 signals the wake flag
    pub fn wait_for_wake(&self) {
        while !self.channel.wake.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }
    }

    /// Arm the software interrupt and sleep until it fires
    ///
    /// Returns with the interrupt disabled, cleared and unregistered.
    pub fn park<I: InterProcessorInterrupt>(&self, ipi: &mut I) {
        ipi.init();
        ipi.clear();
        ipi.enable();
        self.channel.armed.store(true, Ordering::Release);

        while !ipi.is_pending() {
            ipi.wait();
        }

        ipi.disable();
        ipi.clear();
        ipi.unregister();
    }

    /// Tell core 0 this core is about to jump
    pub fn arrive(&self) {
        self.channel.rendezvous.store(true, Ordering::Release);
    }
}

/// Final jump into the loaded image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch {
    /// Address both cores enter
    pub entry: usize,
    /// Wait for console output to drain before jumping
    pub print_settle_ms: u32,
}

impl Launch {
    /// Launch into the load address of `config`
    #[must_use]
    pub const fn new(config: &BootConfig) -> Self {
        Self {
            entry: config.load_address,
            print_settle_ms: config.handoff.print_settle_ms,
        }
    }

    /// Announce, quiesce and jump
    pub fn execute<C, D, S>(self, core: &mut C, delay: &mut D, logger: &mut Logger<S>) -> !
    where
        C: CoreControl,
        D: DelayInterface,
        S: LogSink,
    {
        log_info!(
            logger,
            "handoff",
            "Core {} is jumping to {:#x} now...",
            core.hart_id(),
            self.entry
        );
        delay.delay_ms(self.print_settle_ms);
        core.quiesce();
        core.enter(self.entry)
    }
}

/// Core 1's whole boot path
///
/// Waits for the wake flag, parks until core 0's interrupt, reports at the
/// rendezvous and follows core 0 into the image.
pub fn core1_main<I, C, D, S>(
    port: Core1Port<'_>,
    ipi: &mut I,
    core: &mut C,
    delay: &mut D,
    logger: &mut Logger<S>,
    config: &BootConfig,
) -> !
where
    I: InterProcessorInterrupt,
    C: CoreControl,
    D: DelayInterface,
    S: LogSink,
{
    port.wait_for_wake();
    port.park(ipi);
    port.arrive();
    delay.delay_ms(config.handoff.core1_jump_delay_ms);
    Launch::new(config).execute(core, delay, logger)
}
