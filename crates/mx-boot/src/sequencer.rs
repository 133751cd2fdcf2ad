// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Boot sequencer
//!
//! Core 0's state machine from power-on to the jump:
//!
//! ```text
//! Init -> Core1Armed -> Verifying -> [Repairing] -> Decided -> Handoff -> Jumped
//!                            \______________\______________> Failed
//! ```
//!
//! Everything below the sequencer reports errors as values; this is the
//! only place that decides a boot cannot continue. A failed boot never
//! signals core 1, which stays parked.

use core::fmt;

use heapless::Vec;
use mx_common::config::BootConfig;
use mx_common::constants::BUILD_VERSION;
use mx_common::log::{LogSink, Logger};
use mx_common::{log_debug, log_error, log_info, log_warn};
use mx_common::{Error, SlotId};
use mx_hal::{
    CipherEngine, CoreControl, DelayInterface, DigestEngine, FlashTransport,
    InterProcessorInterrupt, KeyStore,
};

use crate::handoff::{Core0Port, Launch};
use crate::redundancy::RepairDirection;
use crate::retry::PollHook;
use crate::verify::{Outcome, Validator, VerifyError};

/// States recorded per boot
pub const HISTORY_LEN: usize = 8;

/// Boot progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    /// Power-on
    Init,
    /// Core 1 woken and arming its interrupt
    Core1Armed,
    /// Checking both slots
    Verifying,
    /// Copying the valid slot over the invalid one
    Repairing,
    /// Image in RAM is the one to run
    Decided,
    /// Releasing core 1
    Handoff,
    /// Control passed to the image
    Jumped,
    /// Boot abandoned
    Failed,
}

impl BootState {
    /// Check if `next` may follow this state
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Core1Armed)
                | (Self::Core1Armed, Self::Verifying)
                | (Self::Verifying, Self::Repairing)
                | (Self::Verifying | Self::Repairing, Self::Decided)
                | (Self::Decided, Self::Handoff)
                | (Self::Handoff, Self::Jumped)
                | (
                    Self::Init | Self::Core1Armed | Self::Verifying | Self::Repairing,
                    Self::Failed
                )
        )
    }

    /// Check if no transition leaves this state
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Jumped | Self::Failed)
    }

    /// Short name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Core1Armed => "core1-armed",
            Self::Verifying => "verifying",
            Self::Repairing => "repairing",
            Self::Decided => "decided",
            Self::Handoff => "handoff",
            Self::Jumped => "jumped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for BootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-case hex
struct Hex<'a>(&'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Core 0's boot flow
pub struct Sequencer<T, H, D, C, K, S>
where
    T: FlashTransport,
    H: PollHook,
    D: DigestEngine,
    C: CipherEngine,
    K: KeyStore,
    S: LogSink,
{
    config: BootConfig,
    validator: Validator<T, H, D, C, K>,
    logger: Logger<S>,
    state: BootState,
    history: Vec<BootState, HISTORY_LEN>,
}

impl<T, H, D, C, K, S> Sequencer<T, H, D, C, K, S>
where
    T: FlashTransport,
    H: PollHook,
    D: DigestEngine,
    C: CipherEngine,
    K: KeyStore,
    S: LogSink,
{
    /// Create a sequencer logging to `sink` at the configured level
    pub fn new(config: BootConfig, validator: Validator<T, H, D, C, K>, sink: S) -> Self {
        let mut logger = Logger::new(sink);
        logger.set_min_level(config.log_level);
        let mut history = Vec::new();
        let _ = history.push(BootState::Init);
        Self {
            config,
            validator,
            logger,
            state: BootState::Init,
            history,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> BootState {
        self.state
    }

    /// States passed through, oldest first
    #[must_use]
    pub fn history(&self) -> &[BootState] {
        &self.history
    }

    /// Access the logger
    #[must_use]
    pub const fn logger(&self) -> &Logger<S> {
        &self.logger
    }

    /// Access the validator
    pub fn validator(&self) -> &Validator<T, H, D, C, K> {
        &self.validator
    }

    /// Mutable access to the validator
    pub fn validator_mut(&mut self) -> &mut Validator<T, H, D, C, K> {
        &mut self.validator
    }

    /// Run the boot up to the point of no return
    ///
    /// On success `scratch` holds the primary image, core 1 waits at its
    /// jump point and the returned [`Launch`] is all that is left to do.
    pub fn boot<I, DL>(
        &mut self,
        port: Core0Port<'_>,
        ipi: &mut I,
        delay: &mut DL,
        scratch: &mut [u8],
    ) -> Result<Launch, Error>
    where
        I: InterProcessorInterrupt,
        DL: DelayInterface,
    {
        log_info!(
            self.logger,
            "boot",
            "MAIX loader stage {} running with core: {}",
            self.config.stage.number(),
            ipi.hart_id()
        );
        log_info!(self.logger, "boot", "Build: {}", BUILD_VERSION);
        log_debug!(
            self.logger,
            "boot",
            "Next boot RAM address = {:#010x}",
            self.config.load_address
        );

        let map = self.config.flash_map;
        if let Err(e) = map.check(self.config.flash.chip_capacity) {
            return Err(self.fail(e));
        }

        port.wake_core1();
        delay.delay_ms(self.config.handoff.core1_settle_ms);
        self.advance(BootState::Core1Armed)?;
        self.advance(BootState::Verifying)?;

        // Primary last: its payload is what stays in scratch
        let backup = self.verdict(SlotId::Backup, scratch)?;
        let primary = self.verdict(SlotId::Primary, scratch)?;

        let consistent = match self.validator.slots_match(&map) {
            Ok(consistent) => consistent,
            Err(e) => return Err(self.fail(e.into())),
        };

        if consistent {
            if !primary.is_valid() {
                return Err(self.fail(Error::NoValidImage));
            }
        } else {
            log_warn!(self.logger, "redund", "Different image found!");
            self.advance(BootState::Repairing)?;

            let RepairDirection { from, to } = match self.validator.repair(&map, primary, backup) {
                Ok(direction) => direction,
                Err(e) => return Err(self.fail(e)),
            };
            log_info!(
                self.logger,
                "redund",
                "Copy from {} {:#010x} to {} {:#010x}",
                from,
                map.slot(from).base,
                to,
                map.slot(to).base
            );

            if to == SlotId::Primary && !self.verdict(SlotId::Primary, scratch)?.is_valid() {
                return Err(self.fail(Error::NoValidImage));
            }
        }

        self.advance(BootState::Decided)?;
        self.advance(BootState::Handoff)?;

        log_debug!(self.logger, "boot", "Sending IPI");
        port.release_core1(ipi);
        port.wait_rendezvous();
        Ok(Launch::new(&self.config))
    }

    /// Jump into the image on core 0
    pub fn launch<CC, DL>(&mut self, launch: Launch, core: &mut CC, delay: &mut DL) -> !
    where
        CC: CoreControl,
        DL: DelayInterface,
    {
        if self.advance(BootState::Jumped).is_err() {
            // Only reachable without a completed handoff; stay put
            loop {
                core::hint::spin_loop();
            }
        }
        launch.execute(core, delay, &mut self.logger)
    }

    /// Check a slot, failing the boot on a flash timeout
    fn verdict(&mut self, id: SlotId, scratch: &mut [u8]) -> Result<Outcome, Error> {
        self.check_slot(id, scratch)
            .escalate()
            .map_err(|e| self.fail(e))
    }

    fn check_slot(&mut self, id: SlotId, scratch: &mut [u8]) -> Outcome {
        let slot = self.config.flash_map.slot(id);
        log_info!(self.logger, "verify", "Checking {} image at {:#010x}", id, slot.base);

        match self.validator.validate(slot, scratch) {
            Ok(image) => {
                log_debug!(
                    self.logger,
                    "verify",
                    "Code length: {:#010x} = {}",
                    image.len(),
                    image.len()
                );
                log_debug!(self.logger, "verify", "SHA256: {}", Hex(image.digest()));
                if image.header().is_encrypted() {
                    log_debug!(self.logger, "verify", "Payload deciphered");
                }
                log_info!(self.logger, "verify", "{} image ok", id);
                Outcome::Valid
            }
            Err(e) => {
                match e {
                    VerifyError::Oversize { length, limit } => log_debug!(
                        self.logger,
                        "verify",
                        "Code length {:#010x} is larger than {:#010x}",
                        length,
                        limit
                    ),
                    VerifyError::DigestMismatch { stored, computed } => {
                        log_debug!(self.logger, "verify", "SHA256(firmware): {}", Hex(&stored));
                        log_debug!(self.logger, "verify", "SHA256(calculate): {}", Hex(&computed));
                    }
                    _ => {}
                }
                log_warn!(self.logger, "verify", "{} image check failed: {}", id, e);
                e.outcome()
            }
        }
    }

    fn advance(&mut self, next: BootState) -> Result<(), Error> {
        if !self.state.can_transition_to(next) {
            log_error!(
                self.logger,
                "boot",
                "refused transition {} -> {}",
                self.state,
                next
            );
            return Err(Error::InvalidState);
        }
        log_debug!(self.logger, "boot", "{} -> {}", self.state, next);
        self.state = next;
        // Capacity covers the longest legal path
        let _ = self.history.push(next);
        Ok(())
    }

    fn fail(&mut self, error: Error) -> Error {
        if self.advance(BootState::Failed).is_ok() {
            log_error!(self.logger, "boot", "Failed to boot: {}", error);
        }
        error
    }
}
