// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Simulated software-interrupt fabric
//!
//! One shared pending/enable state per hart, with a condition variable
//! standing in for `wfi`. Ports are handed to threads playing the two cores.

use crate::traits::InterProcessorInterrupt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use std::vec::Vec;

/// Longest a simulated `wfi` may block before the test is declared hung
const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Operation recorded on a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpiEvent {
    /// `init`
    Init,
    /// `clear`
    Clear,
    /// `enable`
    Enable,
    /// `disable`
    Disable,
    /// `unregister`
    Unregister,
    /// `send` to a hart
    Send(usize),
    /// `wait` returned
    Woke,
}

#[derive(Debug, Default)]
struct HartLine {
    pending: bool,
    enabled: bool,
    events: Vec<IpiEvent>,
}

#[derive(Debug)]
struct Fabric {
    lines: Mutex<Vec<HartLine>>,
    wakeup: Condvar,
}

/// Shared interrupt fabric for a set of harts
#[derive(Debug, Clone)]
pub struct SimInterconnect {
    fabric: Arc<Fabric>,
}

impl SimInterconnect {
    /// Fabric for `harts` harts
    #[must_use]
    pub fn new(harts: usize) -> Self {
        let lines = (0..harts).map(|_| HartLine::default()).collect();
        Self {
            fabric: Arc::new(Fabric {
                lines: Mutex::new(lines),
                wakeup: Condvar::new(),
            }),
        }
    }

    /// Port for `hart`
    #[must_use]
    pub fn port(&self, hart: usize) -> SimIpi {
        SimIpi {
            hart,
            fabric: Arc::clone(&self.fabric),
        }
    }

    /// Operations recorded on `hart`'s port
    #[must_use]
    pub fn events(&self, hart: usize) -> Vec<IpiEvent> {
        self.lock()[hart].events.clone()
    }

    /// Whether `hart` has an interrupt pending
    #[must_use]
    pub fn is_pending(&self, hart: usize) -> bool {
        self.lock()[hart].pending
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HartLine>> {
        self.fabric.lines.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// One hart's software interrupt line
#[derive(Debug)]
pub struct SimIpi {
    hart: usize,
    fabric: Arc<Fabric>,
}

impl SimIpi {
    fn with_line<R>(&self, f: impl FnOnce(&mut Vec<HartLine>) -> R) -> R {
        let mut lines = self
            .fabric
            .lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut lines)
    }

    fn record(&self, event: IpiEvent) {
        let hart = self.hart;
        self.with_line(|lines| lines[hart].events.push(event));
    }
}

impl InterProcessorInterrupt for SimIpi {
    fn hart_id(&self) -> usize {
        self.hart
    }

    fn init(&mut self) {
        let hart = self.hart;
        self.with_line(|lines| {
            lines[hart].enabled = false;
            lines[hart].events.push(IpiEvent::Init);
        });
    }

    fn clear(&mut self) {
        let hart = self.hart;
        self.with_line(|lines| {
            lines[hart].pending = false;
            lines[hart].events.push(IpiEvent::Clear);
        });
    }

    fn enable(&mut self) {
        let hart = self.hart;
        self.with_line(|lines| {
            lines[hart].enabled = true;
            lines[hart].events.push(IpiEvent::Enable);
        });
    }

    fn disable(&mut self) {
        let hart = self.hart;
        self.with_line(|lines| {
            lines[hart].enabled = false;
            lines[hart].events.push(IpiEvent::Disable);
        });
    }

    fn unregister(&mut self) {
        self.record(IpiEvent::Unregister);
    }

    fn send(&mut self, target: usize) {
        let hart = self.hart;
        self.with_line(|lines| {
            lines[target].pending = true;
            lines[hart].events.push(IpiEvent::Send(target));
        });
        self.fabric.wakeup.notify_all();
    }

    fn is_pending(&self) -> bool {
        let hart = self.hart;
        self.with_line(|lines| lines[hart].pending)
    }

    fn wait(&mut self) {
        let hart = self.hart;
        let lines = self
            .fabric
            .lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let (mut lines, timeout) = self
            .fabric
            .wakeup
            .wait_timeout_while(lines, WAIT_LIMIT, |lines| {
                !(lines[hart].pending && lines[hart].enabled)
            })
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert!(!timeout.timed_out(), "hart {hart} never woken");
        lines[hart].events.push(IpiEvent::Woke);
    }
}
