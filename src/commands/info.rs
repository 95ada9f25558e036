// src/commands/info.rs

//! `info` command: ROM metadata as JSON

use anyhow::{Context, Result};
use romforge::{PackageMode, RomMetadata};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;

/// Print codename, version and the package names they produce
pub fn cmd_info(input: &Path) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("ROM not found: {}", input.display());
    }

    let metadata = RomMetadata::from_input(input)
        .with_context(|| format!("Failed to read metadata from {}", input.display()))?;

    let packages: BTreeMap<&str, String> = PackageMode::ALL
        .iter()
        .map(|mode| (mode.as_str(), metadata.package_name(*mode)))
        .collect();

    let output = json!({
        "metadata": metadata,
        "packages": packages,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
