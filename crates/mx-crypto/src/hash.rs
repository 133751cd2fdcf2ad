// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! SHA-256 digest engine
//!
//! Software implementation of the loader's digest engine interface on top of
//! the `sha2` crate. Produces the same output as the K210 accelerator for the
//! same configuration.

use mx_hal::{DigestConfig, DigestContext, DigestEngine, DIGEST_LEN};
use sha2::{Digest, Sha256};

/// SHA-256 engine
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Engine;

impl Sha256Engine {
    /// Create the engine
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// One-shot SHA-256
    #[must_use]
    pub fn digest(data: &[u8]) -> [u8; DIGEST_LEN] {
        Sha256::digest(data).into()
    }
}

/// Running SHA-256
#[derive(Clone)]
pub struct Sha256Context {
    inner: Sha256,
    double_hash: bool,
    declared: usize,
    absorbed: usize,
}

impl Sha256Context {
    /// Bytes absorbed so far
    #[must_use]
    pub const fn absorbed(&self) -> usize {
        self.absorbed
    }

    /// Length announced at `init`
    #[must_use]
    pub const fn declared(&self) -> usize {
        self.declared
    }
}

impl DigestEngine for Sha256Engine {
    type Context = Sha256Context;

    fn init(&mut self, config: DigestConfig, total_len: usize) -> Self::Context {
        // DMA only changes how the accelerator is fed
        Sha256Context {
            inner: Sha256::new(),
            double_hash: config.double_hash,
            declared: total_len,
            absorbed: 0,
        }
    }
}

impl DigestContext for Sha256Context {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.inner, data);
        self.absorbed += data.len();
    }

    fn finalize(self) -> [u8; DIGEST_LEN] {
        // The accelerator counts blocks from the declared length
        debug_assert_eq!(
            self.absorbed, self.declared,
            "digest fed a different length than declared"
        );
        let first: [u8; DIGEST_LEN] = self.inner.finalize().into();
        if self.double_hash {
            Sha256::digest(first).into()
        } else {
            first
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABC_DIGEST: [u8; 32] = [
        0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae, 0x22,
        0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61, 0xf2, 0x00,
        0x15, 0xad,
    ];

    #[test]
    fn test_known_answer() {
        assert_eq!(Sha256Engine::digest(b"abc"), ABC_DIGEST);
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut engine = Sha256Engine::new();
        let mut ctx = engine.init(DigestConfig::default(), 3);
        ctx.update(b"a");
        ctx.update(b"bc");
        assert_eq!(ctx.absorbed(), 3);
        assert_eq!(ctx.finalize(), ABC_DIGEST);
    }

    #[test]
    fn test_double_hash() {
        let mut engine = Sha256Engine::new();
        let config = DigestConfig {
            dma: false,
            double_hash: true,
        };
        let mut ctx = engine.init(config, 3);
        ctx.update(b"abc");
        assert_eq!(ctx.finalize(), Sha256Engine::digest(&ABC_DIGEST));
    }
}
