// src/installer/shell.rs

//! `update-binary` renderer for recovery-mode installs
//!
//! The script reads images straight out of the zip it was started from and
//! writes each one with `dd`. A failed write is logged and counted; the
//! remaining partitions are still attempted and the script exits non-zero
//! at the end if anything failed.

use super::{FlashTarget, InstallPlan, InstallerState, SlotSuffix};

/// Body of the edify script; recoveries only check that it exists
pub const UPDATER_SCRIPT_PLACEHOLDER: &str = "# Installation is handled by update-binary\n";

/// Block device directories searched for a target, in order
pub const BLOCK_DIRS: &[&str] = &[
    "/dev/block/bootdevice/by-name",
    "/dev/block/by-name",
    "/dev/block/mapper",
];

const PRELUDE: &str = r#"#!/sbin/sh
OUTFD="/proc/self/fd/$2"
ZIPFILE="$3"
FAILED=0

ui_print() {
  echo "ui_print $1" >> "$OUTFD"
  echo "ui_print" >> "$OUTFD"
}

has_image() {
  unzip -l "$ZIPFILE" "$1" >/dev/null 2>&1
}

find_block() {
  for dir in __BLOCK_DIRS__; do
    if [ -e "$dir/$1" ]; then
      echo "$dir/$1"
      return 0
    fi
  done
  return 1
}

flash_image() {
  block=$(find_block "$2")
  if [ -z "$block" ]; then
    ui_print "! $2: block device not found"
    FAILED=$((FAILED + 1))
    return
  fi
  blockdev --setrw "$block" 2>/dev/null
  if unzip -p "$ZIPFILE" "$1" | dd of="$block" bs=1048576 2>/dev/null; then
    ui_print "- $2: done"
  else
    ui_print "! $2: write failed"
    FAILED=$((FAILED + 1))
  fi
}
"#;

/// Render the recovery installer for `plan`
pub fn render_update_binary(plan: &InstallPlan) -> String {
    let mut script = String::new();

    for state in &plan.states {
        match state {
            InstallerState::Init => {
                script.push_str(&PRELUDE.replace("__BLOCK_DIRS__", &BLOCK_DIRS.join(" ")));
                script.push('\n');
                script.push_str(&format!("ui_print \"romforge {} installer\"\n", plan.mode));
            }
            InstallerState::DetectSlot => {
                script.push_str("SLOT=$(getprop ro.boot.slot_suffix)\n");
                script.push_str("ui_print \"- Active slot: ${SLOT:-none}\"\n");
            }
            InstallerState::FlashPartition {
                partition,
                image,
                targets,
            } => {
                script.push('\n');
                script.push_str(&format!("if has_image {image}; then\n"));
                script.push_str(&format!("  ui_print \"Flashing {partition}\"\n"));
                for target in targets {
                    script.push_str(&format!("  flash_image {image} {}\n", target_word(target)));
                }
                script.push_str("fi\n");
            }
            InstallerState::Finalize { unmount } => {
                script.push('\n');
                for name in unmount {
                    script.push_str(&format!("umount /{name} 2>/dev/null\n"));
                }
                script.push_str("if [ \"$FAILED\" -gt 0 ]; then\n");
                script.push_str("  ui_print \"! $FAILED partition write(s) failed\"\n");
                script.push_str("  exit 1\n");
                script.push_str("fi\n");
                script.push_str("ui_print \"- Installation complete\"\n");
            }
            InstallerState::Done => script.push_str("exit 0\n"),
        }
    }

    script
}

/// Shell word naming one target
fn target_word(target: &FlashTarget) -> String {
    match target.suffix {
        SlotSuffix::Active => format!("\"{}$SLOT\"", target.partition),
        _ => target.fixed_name().unwrap_or_else(|| target.partition.clone()),
    }
}
