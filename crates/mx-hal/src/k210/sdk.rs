// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Kendryte standalone SDK bindings
//!
//! The SHA-256 and AES accelerators and the OTP key path are driven through
//! the vendor SDK (`libkendryte.a`, linked by the boot binary's build
//! script). Clock gating and pin muxing go through the same library.
//!
//! # Security
//!
//! - The OTP key is never readable by software; [`OtpKeyPath`] only switches
//!   the hardware route into the AES engine
//! - The AES engine is handed a zero key buffer while the OTP route is open

use crate::error::{HalError, HalResult};
use crate::traits::{
    CipherDirection, CipherEngine, CipherMode, CipherParams, DigestConfig, DigestContext,
    DigestEngine, KeyStore, CIPHER_BLOCK_LEN, DIGEST_LEN,
};
use core::ffi::c_void;

// ============================================================================
// Raw bindings
// ============================================================================

/// SDK SHA-256 context (`SHA256Context`)
#[repr(C)]
struct RawSha256Context {
    total_length: u64,
    hash: [u32; 8],
    buffer_length: u32,
    buffer: [u32; 16],
}

extern "C" {
    fn sysctl_clock_enable(clock: u32) -> i32;
    fn sysctl_clock_disable(clock: u32) -> i32;
    fn sysctl_clock_set_threshold(which: u32, threshold: i32) -> i32;
    fn sysctl_clock_get_freq(clock: u32) -> u32;
    fn sysctl_reset(reset: u32);
    fn fpioa_set_function(number: i32, function: u32) -> i32;

    fn sha256_init(
        dma_en: u8,
        double_sha_en: u8,
        input_size: u32,
        sc: *mut RawSha256Context,
    ) -> i32;
    fn sha256_update(sc: *mut RawSha256Context, data: *const c_void, len: u32);
    fn sha256_final(sc: *mut RawSha256Context, hash: *mut u8);

    fn aes_init(
        key_addr: *mut u8,
        key_length: u8,
        aes_iv: *mut u8,
        iv_length: u8,
        aes_aad: *mut u8,
        cipher_mod: u32,
        encrpt_sel: u32,
        add_size: u32,
        data_size: u32,
    ) -> i32;
    fn aes_process(
        aes_in_data: *mut u8,
        aes_out_data: *mut u8,
        data_size: u32,
        cipher_mod: u32,
    ) -> i32;

    fn otp_key_output_enable();
    fn otp_key_output_disable();

    fn register_core1(callback: extern "C" fn(*mut c_void) -> i32, ctx: *mut c_void) -> i32;
    fn sys_exit(code: i32) -> !;
}

// ============================================================================
// System control
// ============================================================================

/// Clock gates used by the loader (`sysctl_clock_t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SysctlClock {
    /// CPU core clock
    Cpu = 3,
    /// SPI0 controller
    Spi0 = 15,
    /// SPI3 controller
    Spi3 = 18,
    /// AES accelerator
    Aes = 28,
    /// Pin multiplexer
    Fpioa = 29,
}

/// Reset lines used by the loader (`sysctl_reset_t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SysctlReset {
    /// SPI0 controller
    Spi0 = 7,
    /// AES accelerator
    Aes = 20,
}

/// SPI0 clock divider threshold id
pub const THRESHOLD_SPI0: u32 = 4;

/// Enable a clock gate
pub fn clock_enable(clock: SysctlClock) {
    // SAFETY: the SDK call only sets a gate bit in the sysctl block.
    let _ = unsafe { sysctl_clock_enable(clock as u32) };
}

/// Disable a clock gate
pub fn clock_disable(clock: SysctlClock) {
    // SAFETY: the SDK call only clears a gate bit in the sysctl block.
    let _ = unsafe { sysctl_clock_disable(clock as u32) };
}

/// Set a clock divider threshold
pub fn clock_set_threshold(which: u32, threshold: i32) {
    // SAFETY: the SDK validates `which` and writes one divider field.
    let _ = unsafe { sysctl_clock_set_threshold(which, threshold) };
}

/// Current frequency of a clock in Hz
#[must_use]
pub fn clock_frequency(clock: SysctlClock) -> u32 {
    // SAFETY: read-only query of the PLL and divider configuration.
    unsafe { sysctl_clock_get_freq(clock as u32) }
}

/// Pulse a peripheral reset line
pub fn reset(line: SysctlReset) {
    // SAFETY: the SDK asserts and releases one reset bit.
    unsafe { sysctl_reset(line as u32) }
}

/// Route IO 8..13 to SPI0 slave select, clock and four data lines
pub fn route_spi0_flash_pins() {
    /// (pin, function): SS0, SCLK, D0..D3
    const PINS: [(i32, u32); 6] = [(8, 12), (9, 17), (10, 4), (11, 5), (12, 6), (13, 7)];
    for (pin, function) in PINS {
        // SAFETY: each call writes a single FPIOA mux register.
        let _ = unsafe { fpioa_set_function(pin, function) };
    }
}

// ============================================================================
// Core start and exit
// ============================================================================

/// Entry point run on core 1 once registered
pub type Core1Entry = extern "C" fn(*mut c_void) -> i32;

/// Release core 1 from the SDK start-up loop into `entry`
pub fn start_core1(entry: Core1Entry) {
    // SAFETY: the SDK stores the callback and context and raises core 1's
    // software interrupt; a null context is never dereferenced by it.
    let _ = unsafe { register_core1(entry, core::ptr::null_mut()) };
}

/// Report `reason` to the host harness and stop this core
pub fn exit(reason: u32) -> ! {
    // SAFETY: terminal call; the SDK flushes and halts.
    unsafe { sys_exit(reason as i32) }
}

// ============================================================================
// SHA-256 accelerator
// ============================================================================

/// SHA-256 accelerator
#[derive(Debug, Default)]
pub struct SdkSha256;

/// Running accelerator hash
pub struct SdkSha256Context {
    raw: RawSha256Context,
}

impl DigestEngine for SdkSha256 {
    type Context = SdkSha256Context;

    fn init(&mut self, config: DigestConfig, total_len: usize) -> Self::Context {
        let mut ctx = SdkSha256Context {
            raw: RawSha256Context {
                total_length: 0,
                hash: [0; 8],
                buffer_length: 0,
                buffer: [0; 16],
            },
        };
        // SAFETY: `raw` is a valid, exclusively borrowed context matching the
        // SDK layout. The SDK programs the expected block count from
        // `input_size`, so exactly `total_len` bytes must follow.
        unsafe {
            sha256_init(
                u8::from(config.dma),
                u8::from(config.double_hash),
                total_len as u32,
                &mut ctx.raw,
            );
        }
        ctx
    }
}

impl DigestContext for SdkSha256Context {
    fn update(&mut self, data: &[u8]) {
        // SAFETY: `data` is a live slice for the duration of the call.
        unsafe { sha256_update(&mut self.raw, data.as_ptr().cast(), data.len() as u32) }
    }

    fn finalize(mut self) -> [u8; DIGEST_LEN] {
        let mut out = [0u8; DIGEST_LEN];
        // SAFETY: `out` has room for the 32-byte digest the SDK writes.
        unsafe { sha256_final(&mut self.raw, out.as_mut_ptr()) }
        out
    }
}

// ============================================================================
// AES accelerator
// ============================================================================

/// AES accelerator
#[derive(Debug, Default)]
pub struct SdkAes {
    ready: bool,
}

impl SdkAes {
    /// Create an idle engine
    #[must_use]
    pub const fn new() -> Self {
        Self { ready: false }
    }

    const fn mode_code(mode: CipherMode) -> u32 {
        match mode {
            CipherMode::Ecb => 0,
            CipherMode::Cbc => 1,
            CipherMode::Gcm => 3,
        }
    }
}

impl CipherEngine for SdkAes {
    fn init(&mut self, params: &CipherParams<'_>) -> HalResult<()> {
        if params.key.len() != 16 || params.iv.len() != 16 {
            return Err(HalError::InvalidParameter);
        }

        clock_enable(SysctlClock::Aes);
        reset(SysctlReset::Aes);

        // The SDK takes mutable pointers but only reads key, IV and AAD
        let mut key = [0u8; 16];
        let mut iv = [0u8; 16];
        key.copy_from_slice(params.key);
        iv.copy_from_slice(params.iv);
        let aad = if params.aad.is_empty() {
            core::ptr::null_mut()
        } else {
            params.aad.as_ptr().cast_mut()
        };
        let direction = match params.direction {
            CipherDirection::Encrypt => 0,
            CipherDirection::Decrypt => 1,
        };

        // SAFETY: key and IV are 16-byte locals, AAD is null or a live slice
        // of `aad.len()` bytes.
        let rc = unsafe {
            aes_init(
                key.as_mut_ptr(),
                16,
                iv.as_mut_ptr(),
                16,
                aad,
                Self::mode_code(params.mode),
                direction,
                params.aad.len() as u32,
                params.data_len as u32,
            )
        };
        key.fill(0);
        if rc != 0 {
            return Err(HalError::EngineFault);
        }
        self.ready = true;
        Ok(())
    }

    fn process(
        &mut self,
        input: &[u8; CIPHER_BLOCK_LEN],
        output: &mut [u8; CIPHER_BLOCK_LEN],
        mode: CipherMode,
    ) -> HalResult<()> {
        if !self.ready {
            return Err(HalError::NotInitialized);
        }
        let mut block = *input;
        // SAFETY: both pointers cover exactly one 16-byte block.
        let rc = unsafe {
            aes_process(
                block.as_mut_ptr(),
                output.as_mut_ptr(),
                CIPHER_BLOCK_LEN as u32,
                Self::mode_code(mode),
            )
        };
        if rc != 0 {
            return Err(HalError::EngineFault);
        }
        Ok(())
    }
}

// ============================================================================
// OTP key path
// ============================================================================

/// Hardware route from the OTP AES key into the AES engine
#[derive(Debug, Default)]
pub struct OtpKeyPath;

impl KeyStore for OtpKeyPath {
    fn enable_key_output(&mut self) {
        // SAFETY: toggles the OTP key output enable; no memory is touched.
        unsafe { otp_key_output_enable() }
    }

    fn disable_key_output(&mut self) {
        // SAFETY: see `enable_key_output`.
        unsafe { otp_key_output_disable() }
    }
}
