// src/cli/mod.rs
//! CLI definitions for romforge
//!
//! Conversion commands take exactly two positionals, the ROM and the output
//! directory. The remaining commands inspect inputs and the environment:
//! - `detect` - Show how a bundle would be extracted
//! - `info` - Print ROM metadata as JSON
//! - `tools` - Report which external providers resolve

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "romforge")]
#[command(version)]
#[command(about = "Convert Android base ROMs into fastboot and recovery packages", long_about = None)]
pub struct Cli {
    /// Configuration file (default: $ROMFORGE_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Plain log lines instead of a progress bar
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a fastboot package with a rebuilt super image
    Super {
        /// ROM archive, image, or extracted directory
        input: PathBuf,
        /// Directory the package is written to
        output: PathBuf,
    },

    /// Build a recovery zip that writes both A/B slots
    Hybrid {
        /// ROM archive, image, or extracted directory
        input: PathBuf,
        /// Directory the package is written to
        output: PathBuf,
    },

    /// Build a recovery zip that writes the active slot only
    Recovery {
        /// ROM archive, image, or extracted directory
        input: PathBuf,
        /// Directory the package is written to
        output: PathBuf,
    },

    /// Show the detected format and extraction plan for a ROM
    Detect {
        /// ROM archive, image, or extracted directory
        bundle: PathBuf,
    },

    /// Print ROM codename and version as JSON
    Info {
        /// ROM archive or extracted directory
        input: PathBuf,
    },

    /// Check that the external providers can be found
    Tools,
}
