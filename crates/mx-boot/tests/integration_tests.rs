// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Integration tests for mx-boot
//!
//! Boot scenarios against a simulated SPI NOR chip: slot validation and
//! decryption, slot repair in both directions, failed boots, and the full
//! dual-core handoff with core 1 on its own thread.

use std::panic::{self, AssertUnwindSafe};

use mx_boot::flash::FlashDevice;
use mx_boot::handoff::{core1_main, HandoffChannel, Launch};
use mx_boot::image::{encode, ImageHeader};
use mx_boot::redundancy::{Reconciliation, RepairDirection};
use mx_boot::retry::SpinHook;
use mx_boot::sequencer::{BootState, Sequencer};
use mx_boot::verify::{Validator, VerifyError};
use mx_common::config::{BootConfig, FlashConfig, FlashMap, FlashSlot};
use mx_common::constants::IMAGE_FLAG_CIPHER;
use mx_common::log::{LogLevel, Logger};
use mx_common::{Error, SlotId};
use mx_crypto::{AesEngine, Sha256Engine};
use mx_hal::sim::{
    CoreEvent, IpiEvent, KeyEvent, SimConsole, SimCore, SimDelay, SimFlash, SimInterconnect,
    SimKeyStore,
};
use mx_hal::{CipherDirection, CipherEngine, CipherMode, CipherParams, ConsoleSink};

const CHIP: u32 = 0x4000;
const PRIMARY: FlashSlot = FlashSlot::new(0, 0x2000);
const BACKUP: FlashSlot = FlashSlot::new(0x2000, 0x2000);
const MAP: FlashMap = FlashMap::new(PRIMARY, BACKUP);
const KEY: [u8; 16] = *b"maix-otp-key-001";

type TestValidator = Validator<SimFlash, SpinHook, Sha256Engine, AesEngine, SimKeyStore>;
type TestSequencer =
    Sequencer<SimFlash, SpinHook, Sha256Engine, AesEngine, SimKeyStore, ConsoleSink<SimConsole>>;

fn boot_config() -> BootConfig {
    BootConfig {
        flash_map: MAP,
        flash: FlashConfig {
            chip_capacity: CHIP,
            ..FlashConfig::DEFAULT
        },
        log_level: LogLevel::Debug,
        ..BootConfig::DEFAULT
    }
}

/// Helper: encode a record for `payload`
fn record(flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; payload.len() + 64];
    let n = encode(&mut Sha256Engine::new(), flags, payload, &mut out).unwrap();
    out.truncate(n);
    out
}

/// Helper: AES-128-CBC encrypt with a zero IV, the way the packer does
fn encrypt(plain: &[u8]) -> Vec<u8> {
    let mut engine = AesEngine::new();
    engine
        .init(&CipherParams {
            key: &KEY,
            iv: &[0u8; 16],
            aad: &[],
            mode: CipherMode::Cbc,
            direction: CipherDirection::Encrypt,
            data_len: plain.len(),
        })
        .unwrap();
    let mut out = Vec::with_capacity(plain.len());
    for block in plain.chunks_exact(16) {
        let mut input = [0u8; 16];
        let mut output = [0u8; 16];
        input.copy_from_slice(block);
        engine.process(&input, &mut output, CipherMode::Cbc).unwrap();
        out.extend_from_slice(&output);
    }
    out
}

/// Helper: chip with `primary` and `backup` records in place
fn flash_with(primary: &[u8], backup: &[u8]) -> SimFlash {
    let mut flash = SimFlash::new(CHIP as usize);
    flash.load(PRIMARY.base, primary);
    flash.load(BACKUP.base, backup);
    flash
}

fn validator(flash: SimFlash) -> TestValidator {
    let config = boot_config();
    Validator::new(
        FlashDevice::new(flash, &config.flash),
        Sha256Engine::new(),
        AesEngine::with_hidden_key(KEY),
        SimKeyStore::new(),
        &config.flash,
    )
}

fn sequencer(flash: SimFlash, console: &SimConsole) -> TestSequencer {
    Sequencer::new(boot_config(), validator(flash), ConsoleSink::new(console.clone()))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| String::from(*s)))
        .unwrap_or_default()
}

/// Run core 0's boot with core 1 on its own thread
///
/// Returns the launch and core 1's panic message once it entered the image.
fn boot_dual_core(
    seq: &mut TestSequencer,
    scratch: &mut [u8],
) -> (Launch, String, SimInterconnect) {
    let channel = HandoffChannel::new();
    let fabric = SimInterconnect::new(2);
    let config = boot_config();
    let core0 = channel.take_core0().unwrap();
    let core1 = channel.take_core1().unwrap();

    let (launch, message) = std::thread::scope(|s| {
        let secondary = s.spawn(|| {
            let mut ipi = fabric.port(1);
            let mut core = SimCore::new(1);
            let mut delay = SimDelay::new();
            let mut logger = Logger::new(());
            core1_main(core1, &mut ipi, &mut core, &mut delay, &mut logger, &config)
        });

        let launch = seq
            .boot(core0, &mut fabric.port(0), &mut SimDelay::new(), scratch)
            .unwrap();
        let message = panic_message(&*secondary.join().unwrap_err());
        (launch, message)
    });
    (launch, message, fabric)
}

/// Run core 0's boot alone; core 1 is never needed when the boot fails
fn boot_core0_only(seq: &mut TestSequencer, scratch: &mut [u8]) -> (Error, SimInterconnect) {
    let channel = HandoffChannel::new();
    let fabric = SimInterconnect::new(2);
    let err = seq
        .boot(channel.take_core0().unwrap(), &mut fabric.port(0), &mut SimDelay::new(), scratch)
        .unwrap_err();
    (err, fabric)
}

mod validation_tests {
    use super::*;

    #[test]
    fn test_matching_slots_need_no_repair() {
        let image = record(0, &[1, 2, 3, 4]);
        let mut v = validator(flash_with(&image, &image));
        let mut scratch = [0u8; 64];

        assert_eq!(v.reconcile(&MAP, &mut scratch), Ok(Reconciliation::Consistent));
        assert!(v.flash().transport().stats().erases.is_empty());

        let loaded = v.validate(PRIMARY, &mut scratch).unwrap();
        assert_eq!(loaded.payload(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let image = record(0, &[1, 2, 3, 4]);
        let mut flash = flash_with(&image, &image);
        flash.corrupt(PRIMARY.base + 6, 0x01);
        let mut v = validator(flash);
        let mut scratch = [0u8; 64];

        let err = v.validate(PRIMARY, &mut scratch).unwrap_err();
        assert!(matches!(err, VerifyError::DigestMismatch { .. }));
        assert_eq!(Error::from(err), Error::DigestMismatch);
        assert!(v.validate(BACKUP, &mut scratch).is_ok());
    }

    #[test]
    fn test_any_byte_flip_detected() {
        let image = record(0, &[0x6B; 24]);
        let mut scratch = [0u8; 64];

        // Length bytes excluded: a corrupted length is an oversize or a
        // different record, covered separately
        for offset in 5..image.len() {
            let mut flash = flash_with(&image, &image);
            flash.corrupt(PRIMARY.base + offset as u32, 0x01);
            let mut v = validator(flash);
            let result = v.validate(PRIMARY, &mut scratch);
            assert!(
                matches!(result, Err(VerifyError::DigestMismatch { .. })),
                "flip at offset {offset} went unnoticed"
            );
        }

        let mut flash = flash_with(&image, &image);
        flash.corrupt(PRIMARY.base, 0x01);
        assert!(validator(flash).validate(PRIMARY, &mut scratch).is_err());
    }

    #[test]
    fn test_encrypted_image_decrypted_in_place() {
        let plain: Vec<u8> = (0u8..48).collect();
        let image = record(IMAGE_FLAG_CIPHER, &encrypt(&plain));
        let mut v = validator(flash_with(&image, &image));
        let mut scratch = [0u8; 64];

        let loaded = v.validate(PRIMARY, &mut scratch).unwrap();
        assert!(loaded.header().is_encrypted());
        assert_eq!(loaded.payload(), &plain[..]);
        assert_eq!(v.keys().events(), &[KeyEvent::Enabled, KeyEvent::Disabled]);
    }

    #[test]
    fn test_digest_covers_ciphertext() {
        let plain = [0x42u8; 16];
        let ciphertext = encrypt(&plain);
        let image = record(IMAGE_FLAG_CIPHER, &ciphertext);
        let mut v = validator(flash_with(&image, &image));
        let mut scratch = [0u8; 16];

        let loaded = v.validate(PRIMARY, &mut scratch).unwrap();
        let mut digested = ImageHeader::new(true, 16).to_bytes().to_vec();
        digested.extend_from_slice(&ciphertext);
        assert_eq!(loaded.digest(), &Sha256Engine::digest(&digested));
    }

    #[test]
    fn test_erased_slot_is_oversize() {
        let image = record(0, &[9; 8]);
        let mut v = validator(flash_with(&image, &[]));
        let mut scratch = [0u8; 64];

        assert!(matches!(
            v.validate(BACKUP, &mut scratch),
            Err(VerifyError::Oversize { length: u32::MAX, .. })
        ));
        assert_eq!(v.trailing_digest(BACKUP), Ok(None));
    }
}

mod repair_tests {
    use super::*;

    #[test]
    fn test_garbage_backup_rewritten_from_primary() {
        let image = record(0, &[0xA5; 300]);
        let mut v = validator(flash_with(&image, &[0x00; 700]));
        let mut scratch = vec![0u8; 512];

        assert_eq!(
            v.reconcile(&MAP, &mut scratch),
            Ok(Reconciliation::Repaired(RepairDirection {
                from: SlotId::Primary,
                to: SlotId::Backup,
            }))
        );
        let chip = v.flash().transport();
        assert_eq!(chip.contents(BACKUP.base, image.len()), &image[..]);
        assert_eq!(chip.stats().erases.len(), 1);
        assert!(chip.stats().max_transfer <= 32);
        assert_eq!(v.slots_match(&MAP), Ok(true));
    }

    #[test]
    fn test_corrupt_primary_restored_from_backup() {
        let image = record(0, &[0x3C; 40]);
        let mut flash = flash_with(&image, &image);
        // Trailing digest, so the slots no longer compare equal
        flash.corrupt(PRIMARY.base + 50, 0x80);
        let mut v = validator(flash);
        let mut scratch = [0u8; 64];

        assert_eq!(
            v.reconcile(&MAP, &mut scratch),
            Ok(Reconciliation::Repaired(RepairDirection {
                from: SlotId::Backup,
                to: SlotId::Primary,
            }))
        );
        assert_eq!(v.flash().transport().contents(PRIMARY.base, image.len()), &image[..]);
        assert_eq!(v.validate(PRIMARY, &mut scratch).unwrap().payload(), &[0x3C; 40]);
    }

    #[test]
    fn test_primary_wins_when_both_valid() {
        let newer = record(0, &[2; 16]);
        let older = record(0, &[1; 16]);
        let mut v = validator(flash_with(&newer, &older));
        let mut scratch = [0u8; 64];

        let outcome = v.reconcile(&MAP, &mut scratch).unwrap();
        assert_eq!(
            outcome,
            Reconciliation::Repaired(RepairDirection {
                from: SlotId::Primary,
                to: SlotId::Backup,
            })
        );
        assert_eq!(v.flash().transport().contents(BACKUP.base, newer.len()), &newer[..]);
    }

    #[test]
    fn test_timeout_stops_reconcile_before_writing() {
        let image = record(0, &[3; 16]);
        let mut flash = flash_with(&image, &[0x00; 64]);
        flash.set_stuck_busy(true);
        let config = FlashConfig {
            status_poll_budget: 64,
            ..boot_config().flash
        };
        let mut v = Validator::new(
            FlashDevice::new(flash, &config),
            Sha256Engine::new(),
            AesEngine::with_hidden_key(KEY),
            SimKeyStore::new(),
            &config,
        );
        let mut scratch = [0u8; 64];

        assert_eq!(v.reconcile(&MAP, &mut scratch), Err(Error::FlashTimeout));
        let stats = v.flash().transport().stats();
        assert!(stats.erases.is_empty());
        assert_eq!(stats.programs + stats.quad_programs, 0);
    }

    #[test]
    fn test_no_valid_slot() {
        let image = record(0, &[7; 16]);
        let mut flash = flash_with(&image, &image);
        flash.corrupt(PRIMARY.base + 21, 0x01);
        flash.corrupt(BACKUP.base + 22, 0x02);
        let mut v = validator(flash);
        let mut scratch = [0u8; 64];

        assert_eq!(v.reconcile(&MAP, &mut scratch), Err(Error::NoValidImage));
        assert!(v.flash().transport().stats().erases.is_empty());
    }
}

mod boot_flow_tests {
    use super::*;

    #[test]
    fn test_dual_core_boot_reaches_image() {
        let image = record(0, &[1, 2, 3, 4]);
        let console = SimConsole::new();
        let mut seq = sequencer(flash_with(&image, &image), &console);
        let mut scratch = vec![0u8; boot_config().scratch_size()];

        let (launch, core1_message, fabric) = boot_dual_core(&mut seq, &mut scratch);
        assert_eq!(&scratch[..4], &[1, 2, 3, 4]);
        assert_eq!(launch.entry, 0x8000_0000);
        assert!(core1_message.contains("hart 1 entered image at 0x80000000"));
        assert_eq!(fabric.events(0), [IpiEvent::Send(1)]);
        assert_eq!(seq.state(), BootState::Handoff);
        assert_eq!(
            seq.history(),
            &[
                BootState::Init,
                BootState::Core1Armed,
                BootState::Verifying,
                BootState::Decided,
                BootState::Handoff,
            ]
        );

        let mut core0 = SimCore::new(0);
        let mut delay = SimDelay::new();
        let jumped = panic::catch_unwind(AssertUnwindSafe(|| {
            seq.launch(launch, &mut core0, &mut delay)
        }));
        let message = panic_message(&*jumped.unwrap_err());
        assert!(message.contains("hart 0 entered image at 0x80000000"));
        assert_eq!(seq.state(), BootState::Jumped);
        assert_eq!(core0.events(), [CoreEvent::Quiesced, CoreEvent::Entered(0x8000_0000)]);
        assert_eq!(delay.requests_ms(), &[100]);

        let out = console.output();
        assert!(out.contains("Checking bak image at 0x00002000"));
        assert!(out.contains("Checking app image at 0x00000000"));
        assert!(out.contains("Core 0 is jumping to 0x80000000 now..."));
        assert!(!out.contains("Different image found!"));
    }

    #[test]
    fn test_boot_repairs_primary_before_handoff() {
        let image = record(0, &[0x11; 64]);
        let mut flash = flash_with(&image, &image);
        flash.corrupt(PRIMARY.base + 80, 0x10);
        let console = SimConsole::new();
        let mut seq = sequencer(flash, &console);
        let mut scratch = vec![0u8; boot_config().scratch_size()];

        let (launch, _, _) = boot_dual_core(&mut seq, &mut scratch);
        assert_eq!(launch.entry, 0x8000_0000);
        assert_eq!(&scratch[..64], &[0x11; 64]);
        assert!(seq.history().contains(&BootState::Repairing));
        assert_eq!(
            seq.validator().flash().transport().contents(PRIMARY.base, image.len()),
            &image[..]
        );

        let out = console.output();
        assert!(out.contains("Different image found!"));
        assert!(out.contains("Copy from bak 0x00002000 to app 0x00000000"));
    }

    #[test]
    fn test_boot_repairs_backup_and_runs_primary() {
        let payload: Vec<u8> = (0..200u32).map(|i| (i * 7) as u8).collect();
        let image = record(0, &payload);
        let console = SimConsole::new();
        let mut seq = sequencer(flash_with(&image, &[0x5A; 600]), &console);
        let mut scratch = vec![0u8; boot_config().scratch_size()];

        let (launch, _, fabric) = boot_dual_core(&mut seq, &mut scratch);
        assert_eq!(launch.entry, 0x8000_0000);
        assert_eq!(&scratch[..payload.len()], &payload[..]);
        assert_eq!(fabric.events(0), [IpiEvent::Send(1)]);
        assert_eq!(
            seq.history(),
            &[
                BootState::Init,
                BootState::Core1Armed,
                BootState::Verifying,
                BootState::Repairing,
                BootState::Decided,
                BootState::Handoff,
            ]
        );

        let chip = seq.validator().flash().transport();
        assert_eq!(chip.contents(BACKUP.base, image.len()), &image[..]);
        assert_eq!(chip.contents(PRIMARY.base, image.len()), &image[..]);
        assert_eq!(chip.stats().erases.len(), 1);
        assert_eq!(seq.validator_mut().slots_match(&MAP), Ok(true));

        let out = console.output();
        assert!(out.contains("Different image found!"));
        assert!(out.contains("Copy from app 0x00000000 to bak 0x00002000"));
        // Only the repaired slot is re-read when it is primary
        assert_eq!(out.matches("Checking app image").count(), 1);
    }

    #[test]
    fn test_both_slots_broken_never_hands_off() {
        let image = record(0, &[5; 32]);
        let mut flash = flash_with(&image, &image);
        flash.corrupt(PRIMARY.base + 40, 0x04);
        flash.corrupt(BACKUP.base + 41, 0x08);
        let console = SimConsole::new();
        let mut seq = sequencer(flash, &console);
        let mut scratch = vec![0u8; boot_config().scratch_size()];

        let (err, fabric) = boot_core0_only(&mut seq, &mut scratch);

        assert_eq!(err, Error::NoValidImage);
        assert_eq!(seq.state(), BootState::Failed);
        assert!(!seq.history().contains(&BootState::Handoff));
        assert!(fabric.events(0).is_empty());
        assert!(console.output().contains("Failed to boot"));
    }

    #[test]
    fn test_stuck_flash_fails_boot() {
        let image = record(0, &[5; 32]);
        let mut flash = flash_with(&image, &image);
        flash.set_stuck_busy(true);
        let console = SimConsole::new();
        let config = BootConfig {
            flash: FlashConfig {
                status_poll_budget: 64,
                ..boot_config().flash
            },
            ..boot_config()
        };
        let v = Validator::new(
            FlashDevice::new(flash, &config.flash),
            Sha256Engine::new(),
            AesEngine::with_hidden_key(KEY),
            SimKeyStore::new(),
            &config.flash,
        );
        let mut seq = Sequencer::new(config, v, ConsoleSink::new(console.clone()));
        let mut scratch = vec![0u8; config.scratch_size()];

        let (err, fabric) = boot_core0_only(&mut seq, &mut scratch);

        assert_eq!(err, Error::FlashTimeout);
        assert_eq!(seq.state(), BootState::Failed);
        assert!(fabric.events(0).is_empty());
        // The first timeout ends the attempt; primary is never polled
        let out = console.output();
        assert!(out.contains("bak image check failed"));
        assert!(!out.contains("Checking app image"));
        assert!(!seq.history().contains(&BootState::Repairing));
    }

    #[test]
    fn test_overlapping_map_rejected() {
        let image = record(0, &[5; 32]);
        let console = SimConsole::new();
        let config = BootConfig {
            flash_map: FlashMap::new(PRIMARY, FlashSlot::new(0x1000, 0x2000)),
            ..boot_config()
        };
        let mut seq = Sequencer::new(
            config,
            validator(flash_with(&image, &image)),
            ConsoleSink::new(console.clone()),
        );
        let mut scratch = vec![0u8; 64];

        let channel = HandoffChannel::new();
        let fabric = SimInterconnect::new(2);
        let core0 = channel.take_core0().unwrap();
        let err = seq
            .boot(core0, &mut fabric.port(0), &mut SimDelay::new(), &mut scratch)
            .unwrap_err();
        assert_eq!(err, Error::InvalidParameter);
        assert_eq!(seq.history(), &[BootState::Init, BootState::Failed]);
    }

    #[test]
    fn test_unrepairable_map_rejected_before_flash_access() {
        let image = record(0, &[5; 32]);
        for (map, expected) in [
            (
                FlashMap::new(FlashSlot::new(0, 0x1000), FlashSlot::new(0x1100, 0x1000)),
                Error::FlashAlignment,
            ),
            (
                FlashMap::new(PRIMARY, FlashSlot::new(0x3000, 0x2000)),
                Error::FlashOutOfRange,
            ),
        ] {
            let console = SimConsole::new();
            let config = BootConfig {
                flash_map: map,
                ..boot_config()
            };
            let mut seq = Sequencer::new(
                config,
                validator(flash_with(&image, &[])),
                ConsoleSink::new(console.clone()),
            );
            let mut scratch = vec![0u8; 64];

            let (err, fabric) = boot_core0_only(&mut seq, &mut scratch);
            assert_eq!(err, expected);
            assert_eq!(seq.history(), &[BootState::Init, BootState::Failed]);
            assert!(fabric.events(0).is_empty());
            assert_eq!(seq.validator().flash().transport().stats().reads, 0);
        }
    }
}
