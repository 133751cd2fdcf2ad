// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! A/B slot redundancy
//!
//! The two slots are meant to hold the same image. When their trailing
//! digests differ, the slot that validates overwrites the other one, the
//! primary winning when both do. The copy goes flash to flash through a
//! page-sized stack buffer and never touches the scratch buffer, which
//! holds the image about to run.
//!
//! An interrupted copy leaves the destination partially written; the next
//! boot sees diverging digests again and repeats the repair from the slot
//! that still validates.

use mx_common::config::{FlashMap, FlashSlot};
use mx_common::constants::FLASH_PAGE_SIZE;
use mx_common::{Error, SlotId};
use mx_hal::{CipherEngine, DigestEngine, FlashTransport, KeyStore};

use crate::flash::FlashError;
use crate::retry::PollHook;
use crate::verify::{Outcome, Validator};

/// A completed slot copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairDirection {
    /// Slot copied from
    pub from: SlotId,
    /// Slot overwritten
    pub to: SlotId,
}

/// Result of reconciling the two slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Digests already matched, nothing written
    Consistent,
    /// One slot was rewritten from the other
    Repaired(RepairDirection),
}

/// Slot to repair from, given both verdicts
#[must_use]
pub const fn repair_source(primary: Outcome, backup: Outcome) -> Option<SlotId> {
    if primary.is_valid() {
        Some(SlotId::Primary)
    } else if backup.is_valid() {
        Some(SlotId::Backup)
    } else {
        None
    }
}

impl<T, H, D, C, K> Validator<T, H, D, C, K>
where
    T: FlashTransport,
    H: PollHook,
    D: DigestEngine,
    C: CipherEngine,
    K: KeyStore,
{
    /// Check if both slots carry the same readable trailing digest
    pub fn slots_match(&mut self, map: &FlashMap) -> Result<bool, FlashError> {
        let primary = self.trailing_digest(map.primary)?;
        let backup = self.trailing_digest(map.backup)?;
        Ok(matches!((primary, backup), (Some(a), Some(b)) if a == b))
    }

    /// Copy the record in `from` over `to`
    ///
    /// Erases whole sectors covering the record, then streams header,
    /// payload and digest. Returns the record length.
    pub fn copy_slot(&mut self, from: FlashSlot, to: FlashSlot) -> Result<usize, Error> {
        self.prepare()?;
        let header = self.read_header(from)?;
        if !header.fits(&from) || !header.fits(&to) {
            return Err(Error::Oversize);
        }

        let total = header.record_len();
        self.flash.erase_range(to.base, total)?;

        let mut chunk = [0u8; FLASH_PAGE_SIZE];
        let mut offset = 0usize;
        while offset < total {
            let n = (total - offset).min(chunk.len());
            let buf = &mut chunk[..n];
            self.flash
                .read(from.base + offset as u32, buf, self.read_dialect)?;
            self.flash
                .write(to.base + offset as u32, buf, self.program_mode)?;
            offset += n;
        }
        Ok(total)
    }

    /// Overwrite the invalid slot from the valid one
    pub fn repair(
        &mut self,
        map: &FlashMap,
        primary: Outcome,
        backup: Outcome,
    ) -> Result<RepairDirection, Error> {
        let from = repair_source(primary, backup).ok_or(Error::NoValidImage)?;
        let direction = RepairDirection {
            from,
            to: from.sibling(),
        };
        self.copy_slot(map.slot(direction.from), map.slot(direction.to))?;
        Ok(direction)
    }

    /// Bring both slots back to the same image
    ///
    /// Validates backup, then primary, so a valid primary is what `scratch`
    /// holds afterwards unless the primary itself was rewritten. A flash
    /// timeout while validating ends the attempt without writing anything.
    pub fn reconcile(
        &mut self,
        map: &FlashMap,
        scratch: &mut [u8],
    ) -> Result<Reconciliation, Error> {
        if self.slots_match(map)? {
            return Ok(Reconciliation::Consistent);
        }
        let backup = Outcome::of(&self.validate(map.backup, scratch)).escalate()?;
        let primary = Outcome::of(&self.validate(map.primary, scratch)).escalate()?;
        self.repair(map, primary, backup)
            .map(Reconciliation::Repaired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_preferred() {
        assert_eq!(
            repair_source(Outcome::Valid, Outcome::Valid),
            Some(SlotId::Primary)
        );
        assert_eq!(
            repair_source(Outcome::Valid, Outcome::DigestMismatch),
            Some(SlotId::Primary)
        );
    }

    #[test]
    fn test_backup_used_when_primary_broken() {
        assert_eq!(
            repair_source(Outcome::Oversize, Outcome::Valid),
            Some(SlotId::Backup)
        );
        assert_eq!(
            repair_source(Outcome::FlashTimeout, Outcome::Valid),
            Some(SlotId::Backup)
        );
    }

    #[test]
    fn test_no_source() {
        assert_eq!(
            repair_source(Outcome::DigestMismatch, Outcome::Malformed),
            None
        );
    }
}
