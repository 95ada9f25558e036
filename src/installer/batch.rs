// src/installer/batch.rs

//! `flash-all.bat` renderer for bootloader-mode installs

use super::{InstallPlan, InstallerState, SlotSuffix};
use crate::config::InstallerConfig;
use crate::tools::PLATFORM_TOOLS_DIR;

const VBMETA_FLAGS: &str = "--disable-verity --disable-verification";

/// Render the Windows fastboot script for `plan`
///
/// Lines end in CRLF. Every write goes through one `:flash` subroutine that
/// skips missing images and counts failures.
pub fn render_flash_all(plan: &InstallPlan, config: &InstallerConfig) -> String {
    let mut lines: Vec<String> = Vec::new();

    for state in &plan.states {
        match state {
            InstallerState::Init => {
                lines.push("@echo off".into());
                lines.push("setlocal".into());
                lines.push("cd /d \"%~dp0\"".into());
                lines.push(format!("set FASTBOOT={PLATFORM_TOOLS_DIR}\\fastboot.exe"));
                lines.push("set FAILED=0".into());
                lines.push(String::new());
                lines.push("if not exist \"%FASTBOOT%\" (".into());
                lines.push("  echo fastboot.exe not found in %FASTBOOT%".into());
                lines.push("  exit /b 1".into());
                lines.push(")".into());
            }
            InstallerState::DetectSlot => {
                lines.push(String::new());
                lines.push("echo Current slot:".into());
                lines.push("\"%FASTBOOT%\" getvar current-slot".into());
            }
            InstallerState::FlashPartition {
                partition,
                image,
                targets,
            } => {
                let flags = if config.disable_vbmeta_verification && partition == "vbmeta" {
                    VBMETA_FLAGS
                } else {
                    ""
                };
                for target in targets {
                    let name = match target.suffix {
                        // fastboot applies the current slot itself
                        SlotSuffix::Active => target.partition.clone(),
                        _ => target.fixed_name().unwrap_or_else(|| target.partition.clone()),
                    };
                    lines.push(format!("call :flash {name} {image} \"{flags}\""));
                }
            }
            InstallerState::Finalize { .. } => {
                lines.push(String::new());
                lines.push("if %FAILED% gtr 0 (".into());
                lines.push("  echo %FAILED% partition write^(s^) failed".into());
                lines.push("  exit /b 1".into());
                lines.push(")".into());
                lines.push("echo Flashing complete, rebooting".into());
                lines.push("\"%FASTBOOT%\" reboot".into());
            }
            InstallerState::Done => {
                lines.push("exit /b 0".into());
                lines.push(String::new());
                lines.push(":flash".into());
                lines.push("if not exist \"%~2\" goto :eof".into());
                lines.push("echo Flashing %~1".into());
                lines.push("\"%FASTBOOT%\" %~3 flash %~1 \"%~2\"".into());
                lines.push("if errorlevel 1 (".into());
                lines.push("  echo Failed to flash %~1".into());
                lines.push("  set /a FAILED+=1".into());
                lines.push(")".into());
                lines.push("goto :eof".into());
            }
        }
    }

    let mut script = lines.join("\r\n");
    script.push_str("\r\n");
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::PackageMode;

    fn calls(script: &str) -> Vec<&str> {
        script.lines().filter(|l| l.starts_with("call :flash ")).collect()
    }

    #[test]
    fn test_super_package_script() {
        let plan = InstallPlan::new(PackageMode::Super, ["super", "boot", "vbmeta"]);
        let script = render_flash_all(&plan, &InstallerConfig::default());
        assert!(script.contains("\r\n"));
        assert!(script.contains("set FASTBOOT=platform-tools\\fastboot.exe"));
        assert_eq!(
            calls(&script),
            vec![
                "call :flash boot_a boot.img \"\"",
                "call :flash boot_b boot.img \"\"",
                "call :flash vbmeta_a vbmeta.img \"\"",
                "call :flash vbmeta_b vbmeta.img \"\"",
                "call :flash super super.img \"\"",
            ]
        );
    }

    #[test]
    fn test_vbmeta_verification_toggle() {
        let plan = InstallPlan::new(PackageMode::Super, ["vbmeta", "vbmeta_system"]);
        let config = InstallerConfig {
            disable_vbmeta_verification: true,
        };
        let script = render_flash_all(&plan, &config);
        assert!(script.contains(
            "call :flash vbmeta_a vbmeta.img \"--disable-verity --disable-verification\""
        ));
        assert!(script.contains("call :flash vbmeta_system_a vbmeta_system.img \"\""));
    }

    #[test]
    fn test_failures_counted_and_checked_after_all_writes() {
        let plan = InstallPlan::new(PackageMode::Super, ["boot"]);
        let script = render_flash_all(&plan, &InstallerConfig::default());
        assert!(script.contains("set /a FAILED+=1"));
        let check = script.find("if %FAILED% gtr 0").unwrap();
        let last_call = script.rfind("call :flash").unwrap();
        assert!(check > last_call);
        assert!(script.contains("getvar current-slot"));
    }
}
