// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Image record layout
//!
//! ```text
//! Offset   Size  Field
//! 0        1     Flags (bit 0: payload is AES-128-CBC encrypted)
//! 1        4     Payload length N (little-endian)
//! 5        N     Payload
//! 5+N      32    SHA-256 over bytes [0, 5+N)
//! ```
//!
//! The digest covers the ciphertext of encrypted images. The packer side
//! ([`encode`], [`padded_payload_len`]) produces flashable records for the
//! tests and for host tooling.

use mx_common::config::FlashSlot;
use mx_common::constants::{
    IMAGE_DIGEST_SIZE, IMAGE_FLAG_CIPHER, IMAGE_HEADER_SIZE, IMAGE_OVERHEAD, IMAGE_PAD_ALIGN,
};
use mx_common::Error;
use mx_hal::{DigestConfig, DigestContext, DigestEngine, DIGEST_LEN};

/// Fixed header in front of every payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// Flag byte
    pub flags: u8,
    /// Payload length in bytes
    pub payload_len: u32,
}

impl ImageHeader {
    /// Encoded size
    pub const SIZE: usize = IMAGE_HEADER_SIZE;

    /// Header for a plain or encrypted payload
    #[must_use]
    pub const fn new(encrypted: bool, payload_len: u32) -> Self {
        Self {
            flags: if encrypted { IMAGE_FLAG_CIPHER } else { 0 },
            payload_len,
        }
    }

    /// Decode
    #[must_use]
    pub const fn parse(bytes: &[u8; IMAGE_HEADER_SIZE]) -> Self {
        Self {
            flags: bytes[0],
            payload_len: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
        }
    }

    /// Encode
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; IMAGE_HEADER_SIZE] {
        let len = self.payload_len.to_le_bytes();
        [self.flags, len[0], len[1], len[2], len[3]]
    }

    /// Check if the payload must be decrypted
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.flags & IMAGE_FLAG_CIPHER != 0
    }

    /// Bytes covered by the digest
    #[must_use]
    pub const fn digested_len(&self) -> usize {
        IMAGE_HEADER_SIZE + self.payload_len as usize
    }

    /// Bytes the whole record occupies in flash
    #[must_use]
    pub const fn record_len(&self) -> usize {
        IMAGE_OVERHEAD + self.payload_len as usize
    }

    /// Check if the record fits in `slot`
    #[must_use]
    pub const fn fits(&self, slot: &FlashSlot) -> bool {
        self.payload_len <= slot.max_payload_len()
    }

    /// Flash offset of the payload in `slot`
    #[must_use]
    pub const fn payload_offset(slot: &FlashSlot) -> u32 {
        slot.base + IMAGE_HEADER_SIZE as u32
    }

    /// Flash offset of the digest in `slot`
    #[must_use]
    pub const fn digest_offset(&self, slot: &FlashSlot) -> u32 {
        Self::payload_offset(slot) + self.payload_len
    }
}

/// Payload length after padding so the record fills whole 64-byte lines
#[must_use]
pub const fn padded_payload_len(len: usize) -> usize {
    let rem = (len + IMAGE_OVERHEAD) % IMAGE_PAD_ALIGN;
    if rem == 0 {
        len
    } else {
        len + IMAGE_PAD_ALIGN - rem
    }
}

/// Write the record for `payload` into `out`
///
/// Returns the record length. `payload` is written as given; pad it with
/// [`padded_payload_len`] first when producing a flashable image.
pub fn encode<D: DigestEngine>(
    digest: &mut D,
    flags: u8,
    payload: &[u8],
    out: &mut [u8],
) -> Result<usize, Error> {
    let payload_len = u32::try_from(payload.len()).map_err(|_| Error::InvalidParameter)?;
    let header = ImageHeader {
        flags,
        payload_len,
    };
    let total = header.record_len();
    let record = out.get_mut(..total).ok_or(Error::BufferTooSmall)?;

    let (body, tail) = record.split_at_mut(header.digested_len());
    body[..IMAGE_HEADER_SIZE].copy_from_slice(&header.to_bytes());
    body[IMAGE_HEADER_SIZE..].copy_from_slice(payload);

    let mut ctx = digest.init(DigestConfig::default(), body.len());
    ctx.update(body);
    let sum: [u8; DIGEST_LEN] = ctx.finalize();
    tail[..IMAGE_DIGEST_SIZE].copy_from_slice(&sum);
    Ok(total)
}
