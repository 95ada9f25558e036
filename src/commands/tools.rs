// src/commands/tools.rs

//! `tools` command: provider availability

use anyhow::Result;
use romforge::{CancelToken, ExternalTools, ForgeConfig};

/// Report where each provider resolves
pub fn cmd_tools(config: &ForgeConfig) -> Result<()> {
    println!("Checking external providers...\n");

    let tools = ExternalTools::new(config, CancelToken::new());
    let statuses = tools.check();
    let status = |present: bool| if present { "[OK]" } else { "[MISSING]" };

    for tool in &statuses {
        println!(
            "  {:<10} {:<15} {}",
            status(tool.resolved.is_some()),
            tool.name,
            tool.resolved
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| format!("{} not found", tool.configured.display()))
        );
    }

    match &config.platform_tools.local_dir {
        Some(dir) => println!("\n  Platform tools: copied from {}", dir.display()),
        None => println!("\n  Platform tools: downloaded from {}", config.platform_tools.url),
    }

    let missing = statuses.iter().filter(|s| s.resolved.is_none()).count();
    if missing > 0 {
        println!("\n{} provider(s) missing; conversions that need them will fail.", missing);
    } else {
        println!("\nAll providers found.");
    }
    Ok(())
}
