// src/pipeline.rs

//! One parameterized conversion pipeline for every package mode
//!
//! ```text
//! unpack-input -> detect -> [expand-payload] -> [unpack-super] -> collect
//!              -> [build-container] -> assemble
//! ```
//!
//! Each step either hands a well-formed result to the next one or fails
//! the whole job. Failures are tagged with the step name. The working
//! directory is removed before [`Pipeline::run`] returns, on every path.

use crate::assemble::{AssemblyInput, Package, assemble};
use crate::bundle::{InputKind, unpack_input};
use crate::collect::{Collected, Collision, Sources, collect};
use crate::config::ForgeConfig;
use crate::container::{BuiltContainer, build_container};
use crate::detect::{BundleFormat, ExtractionStep, scan};
use crate::error::{Error, Result};
use crate::job::{CancelToken, ConversionJob, WorkDir};
use crate::metadata::RomMetadata;
use crate::partition::{SUPER_NAME, partition_name};
use crate::payload::expand_payload;
use crate::progress::{ProgressTracker, SilentProgress};
use crate::tools::Toolbox;
use crate::unpack::unpack_super;
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{info, warn};

/// Named pipeline steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    UnpackInput,
    Detect,
    ExpandPayload,
    UnpackSuper,
    Collect,
    BuildContainer,
    Assemble,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UnpackInput => "unpack-input",
            Self::Detect => "detect",
            Self::ExpandPayload => "expand-payload",
            Self::UnpackSuper => "unpack-super",
            Self::Collect => "collect",
            Self::BuildContainer => "build-container",
            Self::Assemble => "assemble",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a finished conversion produced
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub package: Package,
    pub metadata: RomMetadata,
    pub input_kind: InputKind,
    pub format: BundleFormat,
    /// Steps that ran, in order
    pub steps: Vec<Step>,
    /// Names produced by more than one source
    pub collisions: Vec<Collision>,
    /// The super image needed the sparse conversion path
    pub used_sparse_fallback: bool,
    /// The container was built from `system` alone
    pub minimal_container: bool,
}

/// Runs conversion jobs against a set of providers
pub struct Pipeline<'a> {
    config: &'a ForgeConfig,
    toolbox: &'a dyn Toolbox,
    /// Caller's tracker; each run reports silently without one
    progress: Option<&'a dyn ProgressTracker>,
    cancel: CancelToken,
}

/// Mutable state threaded through the steps of one run
struct RunState<'p> {
    progress: &'p dyn ProgressTracker,
    steps: Vec<Step>,
    sources: Sources,
    used_sparse_fallback: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a ForgeConfig, toolbox: &'a dyn Toolbox) -> Self {
        Self {
            config,
            toolbox,
            progress: None,
            cancel: CancelToken::new(),
        }
    }

    /// Report steps to `progress`
    pub fn with_progress(mut self, progress: &'a dyn ProgressTracker) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Observe `cancel` between steps
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Convert `job.input` into a package under `job.output_dir`
    pub fn run(&self, job: &ConversionJob) -> Result<ConversionReport> {
        job.validate()?;
        self.config.validate()?;

        let silent = SilentProgress::new();
        let progress: &dyn ProgressTracker = match self.progress {
            Some(progress) => progress,
            None => &silent,
        };

        let started = Instant::now();
        let work = WorkDir::create(self.config.work_root.as_deref())?;
        info!("Converting {} to a {} package", job.input.display(), job.mode);

        let mut state = RunState {
            progress,
            steps: Vec::new(),
            sources: Sources::default(),
            used_sparse_fallback: false,
        };
        let result = self.run_in(job, &work, &mut state);

        if let Err(e) = work.close() {
            warn!("Could not remove working directory: {}", e);
        }

        match &result {
            Ok(report) => {
                progress.finish_with_message(&format!("{} ready", report.package.path.display()));
                info!(
                    "Conversion finished in {:.1}s: {}",
                    started.elapsed().as_secs_f64(),
                    report.package.path.display()
                );
            }
            Err(e) => progress.finish_with_error(&e.to_string()),
        }
        result
    }

    fn run_in(
        &self,
        job: &ConversionJob,
        work: &WorkDir,
        state: &mut RunState<'_>,
    ) -> Result<ConversionReport> {
        let policy = job.mode.policy();
        let progress = state.progress;
        progress.set_length(4 + u64::from(policy.builds_container));

        let bundle = work.bundle();
        let input_kind = self.step(state, Step::UnpackInput, || {
            unpack_input(&job.input, &bundle, &self.cancel)
        })?;

        let (scan, metadata) = self.step(state, Step::Detect, || {
            Ok((scan(&bundle)?, RomMetadata::from_dir(&bundle)?))
        })?;
        let format = scan.format();
        info!("Detected {} ({}/{})", format, metadata.codename, metadata.version);
        state.sources.discrete = scan.discrete.clone();

        let mut queue: VecDeque<ExtractionStep> = scan.plan().into();
        progress.set_length(progress.length() + queue.len() as u64 - 1);

        let mut collected = Collected::default();
        while let Some(next) = queue.pop_front() {
            match next {
                ExtractionStep::ExpandPayload(payload) => {
                    let queued_super = queue
                        .iter()
                        .any(|s| matches!(s, ExtractionStep::UnpackSuper(_)));
                    let (images, payload_super) = self.step(state, Step::ExpandPayload, || {
                        let images =
                            expand_payload(self.toolbox, &payload, &work.payload(), &work.scratch())?;
                        let (supers, images): (Vec<_>, Vec<_>) = images
                            .into_iter()
                            .partition(|p| partition_name(p) == Some(SUPER_NAME));
                        let payload_super = if !queued_super && !supers.is_empty() {
                            crate::detect::scan(&work.payload())?.super_image
                        } else {
                            None
                        };
                        Ok((images, payload_super))
                    })?;
                    state.sources.payload = images;

                    if let Some(image) = payload_super {
                        info!("Payload carried a super image, unpacking it");
                        queue.push_front(ExtractionStep::UnpackSuper(image));
                        progress.set_length(progress.length() + 1);
                    }
                }
                ExtractionStep::UnpackSuper(image) => {
                    let report = self.step(state, Step::UnpackSuper, || {
                        unpack_super(self.toolbox, &image, &work.super_out(), &work.scratch())
                    })?;
                    state.used_sparse_fallback = report.used_fallback;
                    state.sources.super_images = report.images;
                }
                ExtractionStep::CollectDiscrete => {
                    let sources = state.sources.clone();
                    collected = self.step(state, Step::Collect, || collect(&sources))?;
                }
            }
        }

        let mut container: Option<BuiltContainer> = None;
        if policy.builds_container && !collected.set.is_empty() {
            let (logical, _) = collected.set.partition_by(|name| self.config.is_logical(name));
            container = Some(self.step(state, Step::BuildContainer, || {
                build_container(
                    self.toolbox,
                    &logical,
                    &self.config.super_image,
                    &work.container(),
                )
            })?);
        }

        let name = metadata.package_name(job.mode);
        let package = self.step(state, Step::Assemble, || {
            let input = AssemblyInput {
                mode: job.mode,
                name: &name,
                images: &collected.set,
                container: container.as_ref(),
                installer: &self.config.installer,
                output_dir: &job.output_dir,
            };
            assemble(self.toolbox, &input, &self.cancel)
        })?;

        Ok(ConversionReport {
            package,
            metadata,
            input_kind,
            format,
            steps: std::mem::take(&mut state.steps),
            collisions: collected.collisions,
            used_sparse_fallback: state.used_sparse_fallback,
            minimal_container: container.is_some_and(|c| c.minimal),
        })
    }

    /// Run one step: check for cancellation, report it, tag any failure
    fn step<T, F>(&self, state: &mut RunState<'_>, step: Step, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.cancel.check().map_err(|e| e.in_step(step.name()))?;
        state.progress.set_message(step.name());
        state.steps.push(step);
        let out = f().map_err(|e| e.in_step(step.name()))?;
        state.progress.increment(1);
        Ok(out)
    }
}

/// Whether an error came from the user cancelling the job
pub fn is_cancelled(err: &Error) -> bool {
    matches!(err.root(), Error::Cancelled)
}
