// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! HAL trait definitions
//!
//! Platform-agnostic interfaces the loader is written against. Hardware
//! implementations live in the `riscv` and `k210` modules; host test doubles
//! in `sim`.

use crate::error::HalResult;

// ============================================================================
// Flash Transport
// ============================================================================

/// Data lanes used by an enhanced SPI frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lanes {
    /// Two data lines
    Dual,
    /// Four data lines
    Quad,
}

impl Lanes {
    /// Frame-format field value for the controller
    #[must_use]
    pub const fn frame_format(&self) -> u32 {
        match self {
            Self::Dual => 1,
            Self::Quad => 2,
        }
    }
}

/// Shape of an enhanced (multi-lane) flash transfer
///
/// The opcode always travels as an 8-bit instruction on one line. The
/// address either follows on that line or is shifted through the data lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnhancedFrame {
    /// Lanes carrying data
    pub lanes: Lanes,
    /// Address phase length in bits (24, or 32 when mode bits ride along)
    pub address_bits: u8,
    /// Dummy cycles between address and data
    pub wait_cycles: u8,
    /// Address sent on the data lanes rather than on one line
    pub address_on_lanes: bool,
}

impl EnhancedFrame {
    /// Instruction length field: 8-bit opcode
    const INST_L_8BIT: u32 = 0x02;

    /// Encode as a DesignWare SSI `spi_ctrlr0` value
    #[must_use]
    pub const fn spi_ctrlr0(&self) -> u32 {
        let trans_type = if self.address_on_lanes { 0x01 } else { 0x00 };
        let addr_l = (self.address_bits as u32 / 4) & 0x0F;
        let wait = (self.wait_cycles as u32) & 0x1F;
        trans_type | (addr_l << 2) | (Self::INST_L_8BIT << 8) | (wait << 11)
    }
}

/// Command/FIFO level access to a SPI NOR chip
///
/// Implementations toggle slave select around each transfer and leave the
/// controller disabled on return. They raise no errors: a wedged controller
/// shows up as a transfer that never completes, and is caught by the bounded
/// status poll in the block device.
pub trait FlashTransport {
    /// Send command bytes followed by `payload`
    fn send(&mut self, command: &[u8], payload: &[u8]);

    /// Send command bytes, then fill `buffer` from the chip
    fn receive(&mut self, command: &[u8], buffer: &mut [u8]);

    /// Send an opcode/address command word pair followed by `payload` over `frame`
    fn send_enhanced(&mut self, frame: &EnhancedFrame, command: &[u32], payload: &[u8]);

    /// Send an opcode/address command word pair, then fill `buffer` over `frame`
    fn receive_enhanced(&mut self, frame: &EnhancedFrame, command: &[u32], buffer: &mut [u8]);
}

impl<T: FlashTransport + ?Sized> FlashTransport for &mut T {
    fn send(&mut self, command: &[u8], payload: &[u8]) {
        (**self).send(command, payload);
    }

    fn receive(&mut self, command: &[u8], buffer: &mut [u8]) {
        (**self).receive(command, buffer);
    }

    fn send_enhanced(&mut self, frame: &EnhancedFrame, command: &[u32], payload: &[u8]) {
        (**self).send_enhanced(frame, command, payload);
    }

    fn receive_enhanced(&mut self, frame: &EnhancedFrame, command: &[u32], buffer: &mut [u8]) {
        (**self).receive_enhanced(frame, command, buffer);
    }
}

// ============================================================================
// Digest Engine
// ============================================================================

/// SHA-256 output length
pub const DIGEST_LEN: usize = 32;

/// Digest engine options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigestConfig {
    /// Feed input through DMA
    pub dma: bool,
    /// Hash the digest a second time
    pub double_hash: bool,
}

/// Hash accumulator factory
pub trait DigestEngine {
    /// Running hash state
    type Context: DigestContext;

    /// Start a hash over exactly `total_len` bytes
    fn init(&mut self, config: DigestConfig, total_len: usize) -> Self::Context;
}

/// Running hash state
pub trait DigestContext {
    /// Absorb more input
    fn update(&mut self, data: &[u8]);

    /// Finish and return the digest
    fn finalize(self) -> [u8; DIGEST_LEN];
}

// ============================================================================
// Cipher Engine
// ============================================================================

/// Block cipher size
pub const CIPHER_BLOCK_LEN: usize = 16;

/// Block cipher chaining mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    /// Electronic codebook
    Ecb,
    /// Cipher block chaining
    Cbc,
    /// Galois/counter mode
    Gcm,
}

/// Cipher direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherDirection {
    /// Plaintext to ciphertext
    Encrypt,
    /// Ciphertext to plaintext
    Decrypt,
}

/// Parameters for [`CipherEngine::init`]
#[derive(Clone, Copy)]
pub struct CipherParams<'a> {
    /// Key bytes (ignored by engines fed from the OTP key path)
    pub key: &'a [u8],
    /// Initialization vector
    pub iv: &'a [u8],
    /// Additional authenticated data (GCM only)
    pub aad: &'a [u8],
    /// Chaining mode
    pub mode: CipherMode,
    /// Direction
    pub direction: CipherDirection,
    /// Total bytes that will be processed
    pub data_len: usize,
}

/// Block cipher accumulator
pub trait CipherEngine {
    /// Load key and IV and reset chaining state
    fn init(&mut self, params: &CipherParams<'_>) -> HalResult<()>;

    /// Process one block
    fn process(
        &mut self,
        input: &[u8; CIPHER_BLOCK_LEN],
        output: &mut [u8; CIPHER_BLOCK_LEN],
        mode: CipherMode,
    ) -> HalResult<()>;
}

/// One-time-programmable key store feeding the cipher engine
///
/// The key never becomes readable; these calls only gate the hardware path
/// from OTP into the cipher engine.
pub trait KeyStore {
    /// Route the provisioned key to the cipher engine
    fn enable_key_output(&mut self);

    /// Cut the key path
    fn disable_key_output(&mut self);
}

// ============================================================================
// Multi-core
// ============================================================================

/// Software interrupt line of one hart
///
/// Each handle manipulates only its own hart's pending and enable bits;
/// [`send`](Self::send) is the only operation reaching another hart.
pub trait InterProcessorInterrupt {
    /// Hart this handle belongs to
    fn hart_id(&self) -> usize;

    /// Prepare the software interrupt line
    fn init(&mut self);

    /// Clear this hart's pending software interrupt
    fn clear(&mut self);

    /// Allow the software interrupt to wake this hart
    fn enable(&mut self);

    /// Stop the software interrupt from waking this hart
    fn disable(&mut self);

    /// Release the line
    fn unregister(&mut self) {}

    /// Raise the software interrupt on `target`
    fn send(&mut self, target: usize);

    /// Check if this hart has a software interrupt pending
    fn is_pending(&self) -> bool;

    /// Halt until an enabled interrupt is pending
    fn wait(&mut self);
}

/// Per-hart control for the final jump
pub trait CoreControl {
    /// Hart this handle belongs to
    fn hart_id(&self) -> usize;

    /// Clear interrupt delegation, pending and enable state and fence the
    /// instruction cache
    fn quiesce(&mut self);

    /// Transfer control to `entry`
    fn enter(&mut self, entry: usize) -> !;
}

// ============================================================================
// Timing and console
// ============================================================================

/// Blocking delays
pub trait DelayInterface {
    /// Delay for specified microseconds
    fn delay_us(&mut self, us: u32);

    /// Delay for specified milliseconds
    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1000);
        }
    }
}

/// Character output
pub trait Console {
    /// Write bytes
    fn write_bytes(&mut self, bytes: &[u8]);

    /// Write a string
    fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }
}
