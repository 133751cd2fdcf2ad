// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Image Validation
//!
//! Loads the image in a flash slot into RAM and checks it before anything
//! runs from it.
//!
//! # Validation Process
//!
//! 1. Reset the flash and set QE when the configured dialect needs it
//! 2. Read the 5-byte header and reject payloads larger than the slot
//! 3. Read the payload into the scratch buffer and the digest after it
//! 4. Hash header and payload and compare with the stored digest
//! 5. Decrypt in place (AES-128-CBC, OTP key) if the header asks for it
//!
//! Decryption only ever runs on a payload whose digest matched. The scratch
//! buffer is handed back only inside [`LoadedImage`]; after an error its
//! contents are unspecified.
//!
//! # Security Features
//!
//! - The OTP key route is closed again on every exit path ([`KeyOutputGuard`])
//! - Optional constant-time digest comparison (`constant-time-digest`)

use core::fmt;

use mx_common::config::{FlashConfig, FlashSlot};
use mx_common::constants::{
    CIPHER_IV_SIZE, CIPHER_KEY_SIZE, IMAGE_DIGEST_SIZE, IMAGE_HEADER_SIZE,
};
use mx_common::{Dialect, Error, ProgramMode};
use mx_hal::{
    CipherDirection, CipherEngine, CipherMode, CipherParams, DigestConfig, DigestContext,
    DigestEngine, FlashTransport, HalError, KeyStore, CIPHER_BLOCK_LEN, DIGEST_LEN,
};
use zeroize::Zeroize;

use crate::flash::{FlashDevice, FlashError};
use crate::image::ImageHeader;
use crate::retry::PollHook;

// ============================================================================
// Outcomes and errors
// ============================================================================

/// Verdict on one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Digest matched (and the payload was decrypted if needed)
    Valid,
    /// Declared payload larger than the slot
    Oversize,
    /// Stored and computed digests differ
    DigestMismatch,
    /// Flash stayed busy past the poll budget
    FlashTimeout,
    /// Record cannot be processed (cipher length, buffer size, engine failure)
    Malformed,
}

impl Outcome {
    /// Verdict for a validation result
    #[must_use]
    pub fn of(result: &Result<LoadedImage<'_>, VerifyError>) -> Self {
        match result {
            Ok(_) => Self::Valid,
            Err(e) => e.outcome(),
        }
    }

    /// Check if the slot can be booted
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Turn a flash timeout into the error that ends the boot attempt
    ///
    /// Every other verdict only rules out its own slot.
    pub const fn escalate(self) -> Result<Self, Error> {
        match self {
            Self::FlashTimeout => Err(Error::FlashTimeout),
            other => Ok(other),
        }
    }

    /// Short name used in console output
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Oversize => "oversize",
            Self::DigestMismatch => "digest mismatch",
            Self::FlashTimeout => "flash timeout",
            Self::Malformed => "malformed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    /// Declared payload length exceeds the slot
    Oversize {
        /// Declared length
        length: u32,
        /// Largest length the slot holds
        limit: u32,
    },
    /// Digest mismatch
    DigestMismatch {
        /// Digest read from flash
        stored: [u8; DIGEST_LEN],
        /// Digest of the record as read
        computed: [u8; DIGEST_LEN],
    },
    /// Encrypted payload not a whole number of cipher blocks
    CipherLength {
        /// Declared length
        length: u32,
    },
    /// Scratch buffer shorter than the payload
    BufferTooSmall {
        /// Bytes required
        needed: usize,
    },
    /// Flash access failed
    Flash(FlashError),
    /// Cipher engine rejected the request
    Crypto(HalError),
}

impl VerifyError {
    /// Verdict this error stands for
    #[must_use]
    pub const fn outcome(&self) -> Outcome {
        match self {
            Self::Oversize { .. } => Outcome::Oversize,
            Self::DigestMismatch { .. } => Outcome::DigestMismatch,
            Self::Flash(FlashError::Timeout) => Outcome::FlashTimeout,
            Self::CipherLength { .. }
            | Self::BufferTooSmall { .. }
            | Self::Flash(_)
            | Self::Crypto(_) => Outcome::Malformed,
        }
    }

    /// Get error code
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::Oversize { .. } => 0x0101,
            Self::DigestMismatch { .. } => 0x0102,
            Self::CipherLength { .. } => 0x0103,
            Self::BufferTooSmall { .. } => 0xFF01,
            Self::Flash(e) => e.code(),
            Self::Crypto(_) => 0x0302,
        }
    }

    /// Get error description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Oversize { .. } => "image larger than slot",
            Self::DigestMismatch { .. } => "image digest mismatch",
            Self::CipherLength { .. } => "encrypted payload not block aligned",
            Self::BufferTooSmall { .. } => "scratch buffer too small",
            Self::Flash(e) => e.description(),
            Self::Crypto(e) => e.description(),
        }
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

impl From<FlashError> for VerifyError {
    fn from(e: FlashError) -> Self {
        Self::Flash(e)
    }
}

impl From<HalError> for VerifyError {
    fn from(e: HalError) -> Self {
        Self::Crypto(e)
    }
}

impl From<VerifyError> for Error {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::Oversize { .. } => Error::Oversize,
            VerifyError::DigestMismatch { .. } => Error::DigestMismatch,
            VerifyError::CipherLength { .. } => Error::CipherLength,
            VerifyError::BufferTooSmall { .. } => Error::BufferTooSmall,
            VerifyError::Flash(e) => e.into(),
            VerifyError::Crypto(_) => Error::CryptoFailure,
        }
    }
}

// ============================================================================
// Loaded image
// ============================================================================

/// A validated image, decrypted in place in the caller's scratch buffer
#[derive(Debug)]
pub struct LoadedImage<'s> {
    header: ImageHeader,
    digest: [u8; DIGEST_LEN],
    payload: &'s mut [u8],
}

impl<'s> LoadedImage<'s> {
    /// Header as read from flash
    #[must_use]
    pub const fn header(&self) -> &ImageHeader {
        &self.header
    }

    /// Digest stored after the payload
    #[must_use]
    pub const fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// Plaintext payload
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.payload
    }

    /// Payload length
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check for an empty payload
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Give back the payload borrow
    #[must_use]
    pub fn into_payload(self) -> &'s mut [u8] {
        self.payload
    }
}

// ============================================================================
// Key route
// ============================================================================

/// Keeps the OTP key routed into the AES engine while alive
pub struct KeyOutputGuard<'k, K: KeyStore> {
    keys: &'k mut K,
}

impl<'k, K: KeyStore> KeyOutputGuard<'k, K> {
    /// Open the key route
    pub fn new(keys: &'k mut K) -> Self {
        keys.enable_key_output();
        Self { keys }
    }
}

impl<K: KeyStore> Drop for KeyOutputGuard<'_, K> {
    fn drop(&mut self) {
        self.keys.disable_key_output();
    }
}

/// Compare a computed digest with the stored one
fn digests_equal(computed: &[u8; DIGEST_LEN], stored: &[u8; DIGEST_LEN]) -> bool {
    cfg_if::cfg_if! {
        if #[cfg(feature = "constant-time-digest")] {
            use subtle::ConstantTimeEq;
            computed[..].ct_eq(&stored[..]).into()
        } else {
            computed.iter().zip(stored.iter()).all(|(a, b)| a == b)
        }
    }
}

// ============================================================================
// Validator
// ============================================================================

/// Validates slots through a flash device and the digest and cipher engines
pub struct Validator<T, H, D, C, K>
where
    T: FlashTransport,
    H: PollHook,
    D: DigestEngine,
    C: CipherEngine,
    K: KeyStore,
{
    pub(crate) flash: FlashDevice<T, H>,
    digest: D,
    cipher: C,
    keys: K,
    pub(crate) read_dialect: Dialect,
    pub(crate) program_mode: ProgramMode,
}

impl<T, H, D, C, K> Validator<T, H, D, C, K>
where
    T: FlashTransport,
    H: PollHook,
    D: DigestEngine,
    C: CipherEngine,
    K: KeyStore,
{
    /// Create a validator using the dialect and program mode in `config`
    pub fn new(
        flash: FlashDevice<T, H>,
        digest: D,
        cipher: C,
        keys: K,
        config: &FlashConfig,
    ) -> Self {
        Self {
            flash,
            digest,
            cipher,
            keys,
            read_dialect: config.read_dialect,
            program_mode: config.program_mode,
        }
    }

    /// Access the flash device
    pub fn flash(&self) -> &FlashDevice<T, H> {
        &self.flash
    }

    /// Mutable access to the flash device
    pub fn flash_mut(&mut self) -> &mut FlashDevice<T, H> {
        &mut self.flash
    }

    /// Access the key store
    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// Dialect used for every read
    #[must_use]
    pub const fn read_dialect(&self) -> Dialect {
        self.read_dialect
    }

    /// Validate the image in `slot`, loading it into `scratch`
    pub fn validate<'s>(
        &mut self,
        slot: FlashSlot,
        scratch: &'s mut [u8],
    ) -> Result<LoadedImage<'s>, VerifyError> {
        self.prepare()?;

        let header = self.read_header(slot)?;
        if !header.fits(&slot) {
            return Err(VerifyError::Oversize {
                length: header.payload_len,
                limit: slot.max_payload_len(),
            });
        }

        let len = header.payload_len as usize;
        let payload = scratch
            .get_mut(..len)
            .ok_or(VerifyError::BufferTooSmall { needed: len })?;
        self.flash
            .read(ImageHeader::payload_offset(&slot), payload, self.read_dialect)?;
        let mut stored = [0u8; IMAGE_DIGEST_SIZE];
        self.flash
            .read(header.digest_offset(&slot), &mut stored, self.read_dialect)?;

        let computed = self.record_digest(&header, payload);
        if !digests_equal(&computed, &stored) {
            return Err(VerifyError::DigestMismatch { stored, computed });
        }

        if header.is_encrypted() {
            if let Err(e) = self.decrypt(payload) {
                // Never leave partial plaintext behind
                payload.zeroize();
                return Err(e);
            }
        }

        Ok(LoadedImage {
            header,
            digest: stored,
            payload,
        })
    }

    /// Digest stored after the payload in `slot`
    ///
    /// `None` when the header declares an oversize payload; nothing past the
    /// header is read in that case.
    pub fn trailing_digest(
        &mut self,
        slot: FlashSlot,
    ) -> Result<Option<[u8; DIGEST_LEN]>, FlashError> {
        self.prepare()?;
        let header = self.read_header(slot)?;
        if !header.fits(&slot) {
            return Ok(None);
        }
        let mut digest = [0u8; IMAGE_DIGEST_SIZE];
        self.flash
            .read(header.digest_offset(&slot), &mut digest, self.read_dialect)?;
        Ok(Some(digest))
    }

    /// Reset the chip and set QE if any configured access needs it
    pub(crate) fn prepare(&mut self) -> Result<(), FlashError> {
        self.flash.init();
        if self.read_dialect.needs_quad_enable() || self.program_mode.needs_quad_enable() {
            self.flash.enable_quad_mode()?;
        }
        Ok(())
    }

    pub(crate) fn read_header(&mut self, slot: FlashSlot) -> Result<ImageHeader, FlashError> {
        let mut bytes = [0u8; IMAGE_HEADER_SIZE];
        self.flash.read(slot.base, &mut bytes, self.read_dialect)?;
        Ok(ImageHeader::parse(&bytes))
    }

    fn record_digest(&mut self, header: &ImageHeader, payload: &[u8]) -> [u8; DIGEST_LEN] {
        let header_bytes = header.to_bytes();
        let mut ctx = self
            .digest
            .init(DigestConfig::default(), header.digested_len());
        // Flag, length and payload go in as the engine sees them on flash
        ctx.update(&header_bytes[..1]);
        ctx.update(&header_bytes[1..]);
        ctx.update(payload);
        ctx.finalize()
    }

    fn decrypt(&mut self, payload: &mut [u8]) -> Result<(), VerifyError> {
        if payload.len() % CIPHER_BLOCK_LEN != 0 {
            return Err(VerifyError::CipherLength {
                length: payload.len() as u32,
            });
        }

        let _route = KeyOutputGuard::new(&mut self.keys);
        // The engine takes its key from OTP while the route is open
        let key = [0u8; CIPHER_KEY_SIZE];
        let iv = [0u8; CIPHER_IV_SIZE];
        self.cipher.init(&CipherParams {
            key: &key,
            iv: &iv,
            aad: &[],
            mode: CipherMode::Cbc,
            direction: CipherDirection::Decrypt,
            data_len: payload.len(),
        })?;

        let mut input = [0u8; CIPHER_BLOCK_LEN];
        let mut output = [0u8; CIPHER_BLOCK_LEN];
        for block in payload.chunks_exact_mut(CIPHER_BLOCK_LEN) {
            input.copy_from_slice(block);
            self.cipher.process(&input, &mut output, CipherMode::Cbc)?;
            block.copy_from_slice(&output);
        }
        Ok(())
    }
}
