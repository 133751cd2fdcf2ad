// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Common types for the MAIX loader
//!
//! Vocabulary shared by the flash driver, the validator and the sequencer.

use core::fmt;

/// SPI wire dialect used to read flash
///
/// Passed explicitly with every read. Quad dialects additionally need the
/// chip's quad-enable bit set, see [`Dialect::needs_quad_enable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Opcode, address and data on one line
    Standard,
    /// Single line with one dummy byte before data
    Fast,
    /// Address on one line, data on two
    DualOutput,
    /// Address and data on two lines
    DualIo,
    /// Address on one line, data on four
    QuadOutput,
    /// Address and data on four lines
    QuadIo,
}

impl Dialect {
    /// All dialects, slowest first
    pub const ALL: [Self; 6] = [
        Self::Standard,
        Self::Fast,
        Self::DualOutput,
        Self::DualIo,
        Self::QuadOutput,
        Self::QuadIo,
    ];

    /// Check if the chip's quad-enable bit must be set for this dialect
    #[must_use]
    pub const fn needs_quad_enable(&self) -> bool {
        matches!(self, Self::QuadOutput | Self::QuadIo)
    }

    /// Check if the dialect goes through the enhanced (multi-lane) transfer path
    #[must_use]
    pub const fn is_enhanced(&self) -> bool {
        !matches!(self, Self::Standard | Self::Fast)
    }

    /// Short name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Fast => "fast",
            Self::DualOutput => "dual-output",
            Self::DualIo => "dual-io",
            Self::QuadOutput => "quad-output",
            Self::QuadIo => "quad-io",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page program opcode family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramMode {
    /// Page program (0x02) on one line
    Standard,
    /// Quad page program (0x32), requires quad enable
    Quad,
}

impl ProgramMode {
    /// Check if the chip's quad-enable bit must be set
    #[must_use]
    pub const fn needs_quad_enable(&self) -> bool {
        matches!(self, Self::Quad)
    }
}

/// One of the two redundant image slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    /// Slot booted from (APP)
    Primary,
    /// Sibling used for repair (BAK)
    Backup,
}

impl SlotId {
    /// The other slot
    #[must_use]
    pub const fn sibling(&self) -> Self {
        match self {
            Self::Primary => Self::Backup,
            Self::Backup => Self::Primary,
        }
    }

    /// Short name used in console output
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "app",
            Self::Backup => "bak",
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which loader stage this build is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderStage {
    /// First stage, loads the second-stage loader
    Stage1,
    /// Second stage, loads the application
    Stage2,
}

impl LoaderStage {
    /// Stage selected at build time
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(feature = "stage1") {
            Self::Stage1
        } else {
            Self::Stage2
        }
    }

    /// Stage number printed in the banner
    #[must_use]
    pub const fn number(&self) -> u8 {
        match self {
            Self::Stage1 => 1,
            Self::Stage2 => 2,
        }
    }
}

/// SPI controller wired to the boot flash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlashBus {
    /// External flash on SPI0
    External,
    /// Internal flash on SPI3
    Internal,
}
