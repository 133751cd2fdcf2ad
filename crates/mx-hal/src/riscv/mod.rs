// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! RISC-V Hardware Abstraction Layer
//!
//! Machine-mode support for the two K210 harts: the CLINT driver and the
//! per-hart control used for the final jump into the loaded image.
//!
//! The CSR helpers compile to no-ops on non-RISC-V hosts so the crate can be
//! checked and unit-tested off target.

pub mod clint;

// Re-export main types
pub use clint::{Clint, CLINT_BASE, K210_TIMER_FREQUENCY};

use crate::traits::CoreControl;

/// Control handle for hart `ID`
///
/// Only code running on hart `ID` may use the handle: every operation acts on
/// the executing hart's own CSRs.
pub struct Hart<const ID: usize> {
    _private: (),
}

impl<const ID: usize> Hart<ID> {
    /// Create the handle
    ///
    /// # Safety
    ///
    /// Must be called on hart `ID`, at most once.
    #[must_use]
    pub const unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl<const ID: usize> CoreControl for Hart<ID> {
    fn hart_id(&self) -> usize {
        ID
    }

    fn quiesce(&mut self) {
        csr::clear_interrupt_state();
        csr::fence_i();
    }

    fn enter(&mut self, entry: usize) -> ! {
        csr::jump(entry)
    }
}

/// CSR (Control and Status Register) access
pub(crate) mod csr {
    /// Machine software interrupt enable bit in `mie`
    pub const MIE_MSIE: usize = 1 << 3;

    cfg_if::cfg_if! {
        if #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))] {
            /// Write a CSR
            macro_rules! write_csr {
                ($csr:literal, $value:expr) => {{
                    let val: usize = $value;
                    // SAFETY: Writing a CSR via CSRW is valid in M-mode. Callers
                    // only write interrupt delegation and enable state.
                    unsafe {
                        core::arch::asm!(
                            concat!("csrw ", $csr, ", {}"),
                            in(reg) val,
                            options(nomem, nostack)
                        );
                    }
                }};
            }

            pub fn set_mie(mask: usize) {
                // SAFETY: CSRS on mie only sets interrupt enable bits of the
                // executing hart.
                unsafe {
                    core::arch::asm!("csrs mie, {}", in(reg) mask, options(nomem, nostack));
                }
            }

            pub fn clear_mie(mask: usize) {
                // SAFETY: CSRC on mie only clears interrupt enable bits of the
                // executing hart.
                unsafe {
                    core::arch::asm!("csrc mie, {}", in(reg) mask, options(nomem, nostack));
                }
            }

            pub fn clear_interrupt_state() {
                write_csr!("mideleg", 0);
                write_csr!("medeleg", 0);
                write_csr!("mie", 0);
                write_csr!("mip", 0);
                write_csr!("sie", 0);
                write_csr!("sip", 0);
            }

            pub fn fence_i() {
                // SAFETY: fence.i only synchronizes the instruction stream with
                // prior stores, which the freshly loaded image requires.
                unsafe {
                    core::arch::asm!("fence.i", options(nostack));
                }
            }

            pub fn wfi() {
                // SAFETY: The WFI (Wait For Interrupt) instruction is a hint that puts the
                // hart into a low-power idle state until an interrupt occurs. It is always
                // valid in M-mode and has no side effects beyond power management.
                unsafe {
                    core::arch::asm!("wfi", options(nomem, nostack));
                }
            }

            pub fn jump(entry: usize) -> ! {
                // SAFETY: The caller verified the image at `entry` and fenced
                // the instruction cache. Control never returns to the loader.
                unsafe {
                    core::arch::asm!("jr {0}", in(reg) entry, options(noreturn));
                }
            }
        } else {
            pub fn set_mie(_mask: usize) {}

            pub fn clear_mie(_mask: usize) {}

            pub fn clear_interrupt_state() {}

            pub fn fence_i() {}

            pub fn wfi() {
                core::hint::spin_loop();
            }

            pub fn jump(_entry: usize) -> ! {
                loop {
                    core::hint::spin_loop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hart_handle_reports_id() {
        // SAFETY: the handle is only inspected, never used to jump
        let hart = unsafe { Hart::<1>::steal() };
        assert_eq!(hart.hart_id(), 1);
    }
}
