// src/mode.rs

//! Output package modes and the policy values each one selects
//!
//! The three package flavors share one pipeline. Everything that differs
//! between them is a field of [`ModePolicy`]:
//!
//! | Mode     | Container | Output            | Compression | Slot targeting |
//! |----------|-----------|-------------------|-------------|----------------|
//! | Super    | rebuilt   | flat directory    | none        | both slots     |
//! | Hybrid   | no        | zip               | deflate     | both slots     |
//! | Recovery | no        | zip               | store       | active slot    |

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Requested package flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageMode {
    /// Fastboot package: rebuilt super image plus `flash-all.bat`
    Super,
    /// Recovery zip writing both A/B slots
    Hybrid,
    /// Recovery zip writing only the active slot
    Recovery,
}

/// Which physical partitions a flash step writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotTargeting {
    /// Always write `<name>_a` and `<name>_b`
    BothSlots,
    /// Write `<name><suffix>` where the suffix is read on the device (may be empty)
    ActiveSlot,
}

/// How the package payload is laid out on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageLayout {
    /// Plain directory, files copied verbatim
    Directory,
    /// Zip archive rooted at the recovery installer prefix
    Zip { compressed: bool },
}

/// Mode-keyed policy values consumed by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModePolicy {
    /// Rebuild a logical-partition container from the collected images
    pub builds_container: bool,
    /// Output layout
    pub layout: PackageLayout,
    /// Slot targeting of the generated installer
    pub slots: SlotTargeting,
    /// Unmount filesystem partitions before the installer exits
    pub unmount_on_finalize: bool,
}

impl PackageMode {
    /// All modes, in CLI order
    pub const ALL: [PackageMode; 3] = [Self::Super, Self::Hybrid, Self::Recovery];

    /// Policy values for this mode
    pub fn policy(&self) -> ModePolicy {
        match self {
            Self::Super => ModePolicy {
                builds_container: true,
                layout: PackageLayout::Directory,
                slots: SlotTargeting::BothSlots,
                unmount_on_finalize: false,
            },
            Self::Hybrid => ModePolicy {
                builds_container: false,
                layout: PackageLayout::Zip { compressed: true },
                slots: SlotTargeting::BothSlots,
                unmount_on_finalize: true,
            },
            Self::Recovery => ModePolicy {
                builds_container: false,
                layout: PackageLayout::Zip { compressed: false },
                slots: SlotTargeting::ActiveSlot,
                unmount_on_finalize: false,
            },
        }
    }

    /// Lowercase name, also used as the output file suffix
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Super => "super",
            Self::Hybrid => "hybrid",
            Self::Recovery => "recovery",
        }
    }
}

impl FromStr for PackageMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "super" => Ok(Self::Super),
            "hybrid" => Ok(Self::Hybrid),
            "recovery" => Ok(Self::Recovery),
            _ => Err(Error::Config(format!(
                "invalid package mode: {s} (expected: super, hybrid, recovery)"
            ))),
        }
    }
}

impl std::fmt::Display for PackageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
