// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Integration tests for mx-common
//!
//! Tests for the error table, flash map configuration and the logger as the
//! boot crate uses them.

#![cfg(test)]

mod error_tests {
    use mx_common::Error;
    use std::collections::HashSet;

    const ALL: [Error; 15] = [
        Error::Oversize,
        Error::DigestMismatch,
        Error::CipherLength,
        Error::NoValidImage,
        Error::FlashTimeout,
        Error::FlashAlignment,
        Error::ZeroLength,
        Error::FlashOutOfRange,
        Error::HardwareInitFailed,
        Error::CryptoFailure,
        Error::HandoffUnavailable,
        Error::BufferTooSmall,
        Error::InvalidParameter,
        Error::InvalidState,
        Error::NotSupported,
    ];

    #[test]
    fn test_error_codes_unique() {
        let codes: HashSet<u16> = ALL.iter().map(Error::code).collect();
        assert_eq!(codes.len(), ALL.len());
    }

    #[test]
    fn test_error_display_format() {
        let text = format!("{}", Error::FlashAlignment);
        assert_eq!(text, "[0x0202] flash offset not sector aligned");
    }

    #[test]
    fn test_every_exit_reason_is_known() {
        let known = [0u32, 24, 233, 234, 255];
        for error in ALL {
            assert!(known.contains(&error.exit_reason()), "{error:?}");
        }
    }
}

mod config_tests {
    use mx_common::constants::IMAGE_OVERHEAD;
    use mx_common::{BootConfig, FlashMap, FlashSlot, LoaderStage, SlotId};

    #[test]
    fn test_default_config_matches_stage() {
        let config = BootConfig::DEFAULT;
        assert_eq!(config.stage, LoaderStage::current());
        assert_eq!(config.flash_map, FlashMap::for_stage(config.stage));
        assert!(config.flash_map.check(config.flash.chip_capacity).is_ok());
    }

    #[test]
    fn test_slot_lookup() {
        let map = FlashMap::new(FlashSlot::new(0, 4096), FlashSlot::new(0x10000, 4096));
        assert_eq!(map.slot(SlotId::Primary).base, 0);
        assert_eq!(map.slot(SlotId::Backup).base, 0x10000);
    }

    #[test]
    fn test_max_payload_leaves_room_for_header_and_digest() {
        for map in [FlashMap::STAGE1, FlashMap::STAGE2] {
            for slot in [map.primary, map.backup] {
                let total = slot.max_payload_len() as usize + IMAGE_OVERHEAD;
                assert_eq!(total, slot.capacity as usize);
            }
        }
    }

    #[test]
    fn test_stage_slots_are_sector_aligned() {
        for map in [FlashMap::STAGE1, FlashMap::STAGE2] {
            assert_eq!(map.primary.base % 4096, 0);
            assert_eq!(map.backup.base % 4096, 0);
        }
    }
}

mod logging_tests {
    use mx_common::log::{LogEntry, LogLevel, LogSink, Logger};
    use mx_common::{log_error, log_info};

    #[derive(Default)]
    struct Lines(Vec<String>);

    impl LogSink for Lines {
        fn emit(&mut self, entry: &LogEntry) {
            self.0.push(entry.to_string());
        }
    }

    #[test]
    fn test_entries_forwarded_in_order() {
        let mut logger = Logger::new(Lines::default());
        log_info!(logger, "seq", "checking slot {}", "app");
        log_error!(logger, "seq", "failed: {}", 7);

        let lines = &logger.sink().0;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "[0000] I [seq] checking slot app");
        assert_eq!(lines[1], "[0001] E [seq] failed: 7");
    }

    #[test]
    fn test_borrowed_sink() {
        let mut lines = Lines::default();
        {
            let mut logger = Logger::new(&mut lines);
            logger.set_min_level(LogLevel::Error);
            log_info!(logger, "seq", "dropped");
            log_error!(logger, "seq", "kept");
        }
        assert_eq!(lines.0.len(), 1);
    }
}
