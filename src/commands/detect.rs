// src/commands/detect.rs

//! `detect` command: show how a ROM would be extracted

use anyhow::{Context, Result};
use romforge::bundle::unpack_input;
use romforge::detect::{ExtractionStep, scan};
use romforge::{CancelToken, ForgeConfig, WorkDir};
use std::path::Path;

/// Print the detected format and the planned extraction steps
pub fn cmd_detect(config: &ForgeConfig, bundle: &Path, cancel: &CancelToken) -> Result<()> {
    if !bundle.exists() {
        anyhow::bail!("ROM not found: {}", bundle.display());
    }

    let work = WorkDir::create(config.work_root.as_deref())
        .context("Failed to create working directory")?;
    let kind = unpack_input(bundle, &work.bundle(), cancel)
        .with_context(|| format!("Failed to unpack {}", bundle.display()))?;
    let found = scan(&work.bundle()).context("Failed to scan bundle")?;

    println!("ROM: {}", bundle.display());
    println!("  Input: {:?}", kind);
    println!("  Format: {}", found.format());
    println!("\nExtraction plan:");
    for (index, step) in found.plan().iter().enumerate() {
        let description = match step {
            ExtractionStep::ExpandPayload(path) => {
                format!("expand payload {}", relative(path, &work.bundle()))
            }
            ExtractionStep::UnpackSuper(image) if image.is_split() => format!(
                "unpack sparse super image ({} chunks)",
                image.chunks.len()
            ),
            ExtractionStep::UnpackSuper(image) => format!(
                "unpack {} super image {}",
                if image.sparse { "sparse" } else { "raw" },
                relative(image.path(), &work.bundle())
            ),
            ExtractionStep::CollectDiscrete => {
                format!("collect {} loose partition image(s)", found.discrete.len())
            }
        };
        println!("  {}. {}", index + 1, description);
    }

    if !found.discrete.is_empty() {
        println!("\nLoose images:");
        for (name, path) in &found.discrete {
            println!("  {:<16} {}", name, relative(path, &work.bundle()));
        }
    }
    if found.payload.is_some() {
        println!("\nThe payload is re-scanned for a super image after expansion.");
    }

    work.close().context("Failed to remove working directory")?;
    Ok(())
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}
