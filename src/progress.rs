// src/progress.rs

//! Step-by-step progress reporting for conversions
//!
//! A conversion is a short, fixed sequence of steps, so progress is a step
//! counter plus a message naming the current step. The pipeline drives a
//! [`ProgressTracker`]; the front end chooses how it is shown:
//!
//! - `CliProgress`: an indicatif bar with the step name
//! - `LogProgress`: one tracing line per step
//! - `SilentProgress`: nothing, for scripted use and tests

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, info};

/// Core trait for progress tracking
///
/// Implementations must be `Send + Sync` so a tracker can be shared with
/// the cancellation listener.
pub trait ProgressTracker: Send + Sync {
    /// Set the current status message
    fn set_message(&self, message: &str);

    /// Advance by `amount` steps
    fn increment(&self, amount: u64);

    /// Set the total number of steps
    fn set_length(&self, length: u64);

    /// Steps completed so far
    fn position(&self) -> u64;

    /// Total number of steps
    fn length(&self) -> u64;

    /// Finish successfully
    fn finish_with_message(&self, message: &str);

    /// Finish with the failing step's report
    fn finish_with_error(&self, message: &str);

    fn is_finished(&self) -> bool;
}

/// Shared counters for the non-visual trackers
#[derive(Debug, Default)]
struct Counters {
    position: AtomicU64,
    length: AtomicU64,
    finished: AtomicBool,
}

impl Counters {
    fn with_length(length: u64) -> Self {
        Self {
            length: AtomicU64::new(length),
            ..Default::default()
        }
    }

    fn advance(&self, amount: u64) -> u64 {
        self.position.fetch_add(amount, Ordering::Relaxed) + amount
    }
}

/// Silent progress tracker (no-op)
#[derive(Debug, Default)]
pub struct SilentProgress {
    counters: Counters,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressTracker for SilentProgress {
    fn set_message(&self, _message: &str) {}

    fn increment(&self, amount: u64) {
        self.counters.advance(amount);
    }

    fn set_length(&self, length: u64) {
        self.counters.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.counters.position.load(Ordering::Relaxed)
    }

    fn length(&self) -> u64 {
        self.counters.length.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, _message: &str) {
        self.counters.finished.store(true, Ordering::Relaxed);
    }

    fn finish_with_error(&self, _message: &str) {
        self.counters.finished.store(true, Ordering::Relaxed);
    }

    fn is_finished(&self) -> bool {
        self.counters.finished.load(Ordering::Relaxed)
    }
}

/// Logging progress tracker
///
/// Each message is logged with the step counter, e.g. `convert [3/7]: collect`.
#[derive(Debug)]
pub struct LogProgress {
    name: String,
    counters: Counters,
}

impl LogProgress {
    pub fn new(name: impl Into<String>, length: u64) -> Self {
        Self {
            name: name.into(),
            counters: Counters::with_length(length),
        }
    }
}

impl ProgressTracker for LogProgress {
    fn set_message(&self, message: &str) {
        info!(
            "{} [{}/{}]: {}",
            self.name,
            self.position() + 1,
            self.length(),
            message
        );
    }

    fn increment(&self, amount: u64) {
        self.counters.advance(amount);
    }

    fn set_length(&self, length: u64) {
        self.counters.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.counters.position.load(Ordering::Relaxed)
    }

    fn length(&self) -> u64 {
        self.counters.length.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, message: &str) {
        self.counters.finished.store(true, Ordering::Relaxed);
        info!("{}: {}", self.name, message);
    }

    fn finish_with_error(&self, message: &str) {
        self.counters.finished.store(true, Ordering::Relaxed);
        error!("{}: {}", self.name, message);
    }

    fn is_finished(&self) -> bool {
        self.counters.finished.load(Ordering::Relaxed)
    }
}

/// Terminal progress bar
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new(name: &str, length: u64) -> Self {
        let bar = ProgressBar::new(length);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix} [{bar:30.cyan/dim}] {pos}/{len} {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("##-"),
        );
        bar.set_prefix(name.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl ProgressTracker for CliProgress {
    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn increment(&self, amount: u64) {
        self.bar.inc(amount);
    }

    fn set_length(&self, length: u64) {
        self.bar.set_length(length);
    }

    fn position(&self) -> u64 {
        self.bar.position()
    }

    fn length(&self) -> u64 {
        self.bar.length().unwrap_or(0)
    }

    fn finish_with_message(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    fn finish_with_error(&self, message: &str) {
        self.bar.abandon_with_message(format!("FAILED: {message}"));
    }

    fn is_finished(&self) -> bool {
        self.bar.is_finished()
    }
}
