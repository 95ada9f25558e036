// src/commands/convert.rs

//! Package conversion commands (`super`, `hybrid`, `recovery`)

use anyhow::{Context, Result};
use romforge::pipeline::is_cancelled;
use romforge::{
    CancelToken, CliProgress, ConversionJob, ExternalTools, ForgeConfig, LogProgress, PackageMode,
    Pipeline, ProgressTracker,
};
use std::path::Path;

/// Convert `input` into a `mode` package under `output`
pub fn cmd_convert(
    config: &ForgeConfig,
    mode: PackageMode,
    input: &Path,
    output: &Path,
    cancel: CancelToken,
    show_progress: bool,
) -> Result<()> {
    let job = ConversionJob::new(input, output, mode);
    let tools = ExternalTools::new(config, cancel.clone());

    let title = format!("romforge {mode}");
    let progress: Box<dyn ProgressTracker> = if show_progress {
        Box::new(CliProgress::new(&title, 0))
    } else {
        Box::new(LogProgress::new(title, 0))
    };

    let pipeline = Pipeline::new(config, &tools)
        .with_progress(progress.as_ref())
        .with_cancel(cancel);

    let report = match pipeline.run(&job) {
        Ok(report) => report,
        Err(e) if is_cancelled(&e) => {
            anyhow::bail!("Conversion of {} cancelled", input.display())
        }
        Err(e) => {
            return Err(e).with_context(|| {
                format!("Failed to build {} package from {}", mode, input.display())
            });
        }
    };

    println!("\n{} package ready: {}", mode, report.package.path.display());
    println!("  ROM: {} {}", report.metadata.codename, report.metadata.version);
    println!("  Input: {:?}, detected {}", report.input_kind, report.format);
    println!("  Partitions: {}", report.package.partitions.join(", "));
    if report.used_sparse_fallback {
        println!("  Super image unpacked through sparse conversion");
    }
    if report.minimal_container {
        println!("  [WARN] Container rebuilt with system only");
    }
    for collision in report.collisions.iter().filter(|c| !c.resolved_by_precedence()) {
        println!("  [WARN] Duplicate {} image for {}", collision.kept, collision.name);
    }

    Ok(())
}
