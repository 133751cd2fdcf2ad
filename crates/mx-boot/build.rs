// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Links the Kendryte standalone SDK into the firmware binary.
//!
//! The SDK supplies the start-up code, linker script, sysctl/FPIOA/SHA/AES
//! drivers and `register_core1`/`sys_exit`. Point `KENDRYTE_SDK_LIB_DIR` at
//! the directory holding `libkendryte.a` and `kendryte.ld`.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=KENDRYTE_SDK_LIB_DIR");
    println!("cargo:rerun-if-changed=build.rs");

    if env::var_os("CARGO_FEATURE_K210").is_none() {
        return;
    }
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "none" {
        return;
    }

    let Some(lib_dir) = env::var_os("KENDRYTE_SDK_LIB_DIR").map(PathBuf::from) else {
        println!("cargo:warning=KENDRYTE_SDK_LIB_DIR not set; the firmware will not link");
        return;
    };

    println!("cargo:rustc-link-search=native={}", lib_dir.display());
    println!("cargo:rustc-link-lib=static=kendryte");

    let script = lib_dir.join("kendryte.ld");
    if script.exists() {
        println!("cargo:rustc-link-arg-bins=-T{}", script.display());
    }
}
