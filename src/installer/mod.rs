// src/installer/mod.rs

//! Installer script generation
//!
//! A generated installer is a straight-line state machine:
//!
//! ```text
//! Init -> DetectSlot -> FlashPartition(p)... -> Finalize -> Done
//! ```
//!
//! [`InstallPlan`] is that sequence as data, built from the packaged
//! partition names and the mode policy. The renderers in [`shell`] and
//! [`batch`] turn a plan into text for the device-side interpreter. Nothing
//! here runs the result.

pub mod batch;
pub mod instructions;
pub mod shell;

pub use batch::render_flash_all;
pub use instructions::render_instructions;
pub use shell::{UPDATER_SCRIPT_PLACEHOLDER, render_update_binary};

use crate::mode::{PackageMode, SlotTargeting};
use crate::partition::{SUPER_NAME, flash_priority, is_filesystem};

/// Recovery installer entry point inside a flashable zip
pub const UPDATE_BINARY_PATH: &str = "META-INF/com/google/android/update-binary";

/// Edify script entry that recoveries require to be present
pub const UPDATER_SCRIPT_PATH: &str = "META-INF/com/google/android/updater-script";

/// Bootloader flasher shipped in Super packages
pub const FLASH_ALL_NAME: &str = "flash-all.bat";

/// Human-readable flashing notes placed beside every package
pub const INSTRUCTIONS_NAME: &str = "INSTRUCTIONS.txt";

/// Slot suffix applied to one write target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSuffix {
    A,
    B,
    /// Suffix read on the device at run time, possibly empty
    Active,
    /// No suffix at all
    Unslotted,
}

/// One physical partition a flash step writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashTarget {
    pub partition: String,
    pub suffix: SlotSuffix,
}

impl FlashTarget {
    /// Target name with a fixed suffix, or `None` when it depends on the device
    pub fn fixed_name(&self) -> Option<String> {
        match self.suffix {
            SlotSuffix::A => Some(format!("{}_a", self.partition)),
            SlotSuffix::B => Some(format!("{}_b", self.partition)),
            SlotSuffix::Unslotted => Some(self.partition.clone()),
            SlotSuffix::Active => None,
        }
    }
}

/// Installer states, in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallerState {
    Init,
    /// Read the active slot property
    DetectSlot,
    /// Write `image` to every target, if the image is in the package
    FlashPartition {
        partition: String,
        image: String,
        targets: Vec<FlashTarget>,
    },
    /// Unmount these filesystem partitions and report completion
    Finalize { unmount: Vec<String> },
    Done,
}

/// The full state sequence of one generated installer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    pub mode: PackageMode,
    pub states: Vec<InstallerState>,
}

impl InstallPlan {
    /// Build the plan for the given packaged partition names
    ///
    /// Names are reordered by flash priority. In Super packages the
    /// container itself is written once, without a slot suffix.
    pub fn new<'a, I>(mode: PackageMode, partitions: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let policy = mode.policy();
        let mut names: Vec<&str> = partitions.into_iter().collect();
        names.sort_by(|a, b| flash_priority(a, b));
        names.dedup();

        let mut states = vec![InstallerState::Init, InstallerState::DetectSlot];
        for name in &names {
            let suffixes: &[SlotSuffix] = match policy.slots {
                _ if mode == PackageMode::Super && *name == SUPER_NAME => &[SlotSuffix::Unslotted],
                SlotTargeting::BothSlots => &[SlotSuffix::A, SlotSuffix::B],
                SlotTargeting::ActiveSlot => &[SlotSuffix::Active],
            };
            states.push(InstallerState::FlashPartition {
                partition: name.to_string(),
                image: crate::partition::image_file_name(name),
                targets: suffixes
                    .iter()
                    .map(|suffix| FlashTarget {
                        partition: name.to_string(),
                        suffix: *suffix,
                    })
                    .collect(),
            });
        }

        let unmount = if policy.unmount_on_finalize {
            names
                .iter()
                .filter(|n| is_filesystem(n))
                .map(|n| n.to_string())
                .collect()
        } else {
            Vec::new()
        };
        states.push(InstallerState::Finalize { unmount });
        states.push(InstallerState::Done);

        Self { mode, states }
    }

    /// The flash steps, in order
    pub fn flash_steps(&self) -> impl Iterator<Item = (&str, &str, &[FlashTarget])> {
        self.states.iter().filter_map(|state| match state {
            InstallerState::FlashPartition {
                partition,
                image,
                targets,
            } => Some((partition.as_str(), image.as_str(), targets.as_slice())),
            _ => None,
        })
    }

    /// Partitions unmounted at `Finalize`
    pub fn unmounts(&self) -> &[String] {
        self.states
            .iter()
            .find_map(|state| match state {
                InstallerState::Finalize { unmount } => Some(unmount.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_sequence_shape() {
        let plan = InstallPlan::new(PackageMode::Recovery, ["system", "boot"]);
        assert_eq!(plan.states.first(), Some(&InstallerState::Init));
        assert_eq!(plan.states[1], InstallerState::DetectSlot);
        assert_eq!(plan.states.last(), Some(&InstallerState::Done));
        let order: Vec<_> = plan.flash_steps().map(|(p, _, _)| p).collect();
        assert_eq!(order, vec!["boot", "system"]);
    }

    #[test]
    fn test_hybrid_targets_exactly_both_slots() {
        let plan = InstallPlan::new(PackageMode::Hybrid, ["boot", "vendor", "dtbo"]);
        for (_, _, targets) in plan.flash_steps() {
            let suffixes: Vec<_> = targets.iter().map(|t| t.suffix).collect();
            assert_eq!(suffixes, vec![SlotSuffix::A, SlotSuffix::B]);
        }
        assert_eq!(plan.unmounts(), ["vendor".to_string()]);
    }

    #[test]
    fn test_recovery_targets_exactly_one_slot() {
        let plan = InstallPlan::new(PackageMode::Recovery, ["boot", "system"]);
        for (_, _, targets) in plan.flash_steps() {
            assert_eq!(targets.len(), 1);
            assert_eq!(targets[0].suffix, SlotSuffix::Active);
            assert_eq!(targets[0].fixed_name(), None);
        }
        assert!(plan.unmounts().is_empty());
    }

    #[test]
    fn test_super_container_is_unslotted() {
        let plan = InstallPlan::new(PackageMode::Super, ["super", "boot"]);
        let steps: Vec<_> = plan.flash_steps().collect();
        assert_eq!(steps[0].0, "boot");
        assert_eq!(steps[0].2.len(), 2);
        assert_eq!(steps[1].0, "super");
        assert_eq!(steps[1].2[0].fixed_name().as_deref(), Some("super"));
    }

    #[test]
    fn test_empty_plan_still_finalizes() {
        let plan = InstallPlan::new(PackageMode::Hybrid, std::iter::empty::<&str>());
        assert_eq!(plan.flash_steps().count(), 0);
        assert_eq!(plan.states.len(), 4);
    }
}
