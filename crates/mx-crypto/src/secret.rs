// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Key and chaining-block storage wiped on drop

use zeroize::{Zeroize, ZeroizeOnDrop};

/// `N` secret bytes, zeroized when dropped or replaced
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> Secret<N> {
    /// Take ownership of `bytes`
    #[must_use]
    pub const fn new(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    /// Copy from a slice of exactly `N` bytes
    #[must_use]
    pub fn copy_from(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; N] = slice.try_into().ok()?;
        Some(Self::new(bytes))
    }

    /// The secret bytes
    #[must_use]
    pub const fn expose(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Mutable secret bytes
    pub fn expose_mut(&mut self) -> &mut [u8; N] {
        &mut self.bytes
    }
}
