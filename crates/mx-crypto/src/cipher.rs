// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! AES-128 block cipher engine
//!
//! Software implementation of the loader's cipher engine interface using the
//! `aes` crate, in ECB or CBC mode. GCM is not provided.
//!
//! # Security
//!
//! - The key schedule is zeroized on drop (`aes/zeroize`)
//! - The chaining block and any held key are wiped on drop and re-init

use crate::error::{CryptoError, CryptoResult};
use crate::secret::Secret;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Block};
use mx_hal::{CipherDirection, CipherEngine, CipherMode, CipherParams, HalResult, CIPHER_BLOCK_LEN};

/// AES-128 key length
pub const AES128_KEY_LEN: usize = 16;

struct Session {
    cipher: Aes128,
    chain: Secret<CIPHER_BLOCK_LEN>,
    mode: CipherMode,
    direction: CipherDirection,
    remaining: usize,
}

/// AES-128 ECB/CBC engine
pub struct AesEngine {
    hidden_key: Option<Secret<AES128_KEY_LEN>>,
    session: Option<Session>,
}

impl AesEngine {
    /// Engine keyed from the parameters passed to `init`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hidden_key: None,
            session: None,
        }
    }

    /// Engine with a key the caller cannot see
    ///
    /// Models the OTP key path: the key passed to `init` is ignored and
    /// `key` is used instead.
    #[must_use]
    pub const fn with_hidden_key(key: [u8; AES128_KEY_LEN]) -> Self {
        Self {
            hidden_key: Some(Secret::new(key)),
            session: None,
        }
    }

    /// Bytes still expected by the current session
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.remaining)
    }

    fn start(&mut self, params: &CipherParams<'_>) -> CryptoResult<()> {
        // Drop any previous session (and its chain) first
        self.session = None;

        if params.mode == CipherMode::Gcm {
            return Err(CryptoError::UnsupportedMode);
        }
        let iv = Secret::<CIPHER_BLOCK_LEN>::copy_from(params.iv)
            .ok_or(CryptoError::InvalidIvLength)?;
        let cipher = match &self.hidden_key {
            Some(key) => Aes128::new(key.expose().into()),
            None => {
                Aes128::new_from_slice(params.key).map_err(|_| CryptoError::InvalidKeyLength)?
            }
        };

        self.session = Some(Session {
            cipher,
            chain: iv,
            mode: params.mode,
            direction: params.direction,
            remaining: params.data_len,
        });
        Ok(())
    }

    fn block(
        &mut self,
        input: &[u8; CIPHER_BLOCK_LEN],
        output: &mut [u8; CIPHER_BLOCK_LEN],
        mode: CipherMode,
    ) -> CryptoResult<()> {
        let session = self.session.as_mut().ok_or(CryptoError::NotInitialized)?;
        if mode != session.mode {
            return Err(CryptoError::ModeMismatch);
        }
        session.remaining = session
            .remaining
            .checked_sub(CIPHER_BLOCK_LEN)
            .ok_or(CryptoError::LengthExceeded)?;

        let chained = mode == CipherMode::Cbc;
        let mut block = Block::from(*input);
        match session.direction {
            CipherDirection::Decrypt => {
                session.cipher.decrypt_block(&mut block);
                if chained {
                    xor_in_place(&mut block, session.chain.expose());
                    session.chain.expose_mut().copy_from_slice(input);
                }
            }
            CipherDirection::Encrypt => {
                if chained {
                    xor_in_place(&mut block, session.chain.expose());
                }
                session.cipher.encrypt_block(&mut block);
                if chained {
                    session.chain.expose_mut().copy_from_slice(&block);
                }
            }
        }
        output.copy_from_slice(&block);
        Ok(())
    }
}

impl Default for AesEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn xor_in_place(block: &mut Block, mask: &[u8; CIPHER_BLOCK_LEN]) {
    for (b, m) in block.iter_mut().zip(mask) {
        *b ^= m;
    }
}

impl CipherEngine for AesEngine {
    fn init(&mut self, params: &CipherParams<'_>) -> HalResult<()> {
        self.start(params).map_err(Into::into)
    }

    fn process(
        &mut self,
        input: &[u8; CIPHER_BLOCK_LEN],
        output: &mut [u8; CIPHER_BLOCK_LEN],
        mode: CipherMode,
    ) -> HalResult<()> {
        self.block(input, output, mode).map_err(Into::into)
    }
}
