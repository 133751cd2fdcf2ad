// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Bounded polling
//!
//! Every wait on hardware state in the loader goes through [`RetryPolicy`],
//! so a wedged device turns into an error value instead of a hang. The hook
//! runs between probes; on target it is a spin hint, in tests a closure that
//! counts probes.

/// Called after each failed probe
pub trait PollHook {
    /// `attempt` counts from zero
    fn on_probe(&mut self, attempt: u32);
}

/// Spin-loop hint between probes
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinHook;

impl PollHook for SpinHook {
    fn on_probe(&mut self, _attempt: u32) {
        core::hint::spin_loop();
    }
}

impl<F: FnMut(u32)> PollHook for F {
    fn on_probe(&mut self, attempt: u32) {
        self(attempt);
    }
}

/// Probe budget ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    /// Probes made
    pub attempts: u32,
}

/// Upper bound on how often a condition is probed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    /// Policy allowing `max_attempts` probes
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Probe budget
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Probe until `ready` returns true
    ///
    /// Returns the number of probes it took.
    pub fn poll<H, P>(&self, hook: &mut H, mut ready: P) -> Result<u32, Exhausted>
    where
        H: PollHook + ?Sized,
        P: FnMut() -> bool,
    {
        for attempt in 0..self.max_attempts {
            if ready() {
                return Ok(attempt + 1);
            }
            hook.on_probe(attempt);
        }
        Err(Exhausted {
            attempts: self.max_attempts,
        })
    }
}
