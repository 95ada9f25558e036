// src/installer/instructions.rs

//! Flashing notes shipped beside each package

use super::FLASH_ALL_NAME;
use crate::mode::PackageMode;

/// Render `INSTRUCTIONS.txt` for a package named `package`
pub fn render_instructions(mode: PackageMode, package: &str) -> String {
    let mut text = format!("{package}\n{}\n\n", "=".repeat(package.len()));

    match mode {
        PackageMode::Super => {
            text.push_str("Fastboot package with a rebuilt super image.\n\n");
            text.push_str("1. Unlock the bootloader and reboot into fastboot mode.\n");
            text.push_str("2. Connect the device over USB.\n");
            text.push_str(&format!("3. Run {FLASH_ALL_NAME} from this directory.\n"));
            text.push_str("4. The device reboots once every image has been written.\n\n");
            text.push_str("Boot images are written to both slots. The super image is written once.\n");
        }
        PackageMode::Hybrid => {
            text.push_str("Recovery zip that writes both A/B slots.\n\n");
            text.push_str("1. Boot into a custom recovery (TWRP or compatible).\n");
            text.push_str(&format!("2. Install {package}.zip.\n"));
            text.push_str("3. Check the recovery log for any partition marked failed.\n\n");
            text.push_str("Every image is written to both _a and _b regardless of the active slot.\n");
        }
        PackageMode::Recovery => {
            text.push_str("Recovery zip that writes the active slot only.\n\n");
            text.push_str("1. Boot into a custom recovery (TWRP or compatible).\n");
            text.push_str(&format!("2. Install {package}.zip.\n"));
            text.push_str("3. Check the recovery log for any partition marked failed.\n\n");
            text.push_str("Devices without A/B slots are written without a suffix.\n");
        }
    }

    text.push_str("\nPartitions whose image is missing from the package are skipped.\n");
    text
}
