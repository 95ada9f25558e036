// tests/common/mod.rs

//! Shared test utilities for integration tests.
//!
//! `MockToolbox` stands in for the Android host tools: it writes fake
//! images where the real providers would and can be told to fail a given
//! call.

#![allow(dead_code)]

use romforge::container::ContainerSpec;
use romforge::{CancelToken, Error, ForgeConfig, Result, Toolbox};
use std::cell::RefCell;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const MIB: u64 = 1024 * 1024;

/// Provider calls, as recorded by [`MockToolbox`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    SparseToRaw,
    LpUnpack,
    LpMake,
    ExtractPayload,
    FetchPlatformTools,
}

#[derive(Default)]
pub struct MockToolbox {
    /// Images written by `lp_unpack`, as (file stem, size)
    pub super_images: Vec<(String, u64)>,
    /// Images written by `extract_payload`
    pub payload_images: Vec<(String, u64)>,
    /// (call kind, zero-based occurrence) pairs that fail
    pub fail_on: Vec<(Call, usize)>,
    /// Cancel this token when the payload extractor runs
    pub cancel_during_payload: Option<CancelToken>,
    pub calls: RefCell<Vec<Call>>,
    pub specs: RefCell<Vec<ContainerSpec>>,
}

impl MockToolbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_super_images(mut self, images: &[(&str, u64)]) -> Self {
        self.super_images = images.iter().map(|(n, s)| (n.to_string(), *s)).collect();
        self
    }

    pub fn with_payload_images(mut self, images: &[(&str, u64)]) -> Self {
        self.payload_images = images.iter().map(|(n, s)| (n.to_string(), *s)).collect();
        self
    }

    pub fn failing(mut self, call: Call, occurrence: usize) -> Self {
        self.fail_on.push((call, occurrence));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Record a call and decide whether it fails
    fn record(&self, call: Call) -> Result<()> {
        let occurrence = self.calls.borrow().iter().filter(|c| **c == call).count();
        self.calls.borrow_mut().push(call);
        if self.fail_on.contains(&(call, occurrence)) {
            return Err(Error::ToolFailed {
                tool: format!("{call:?}"),
                code: 1,
                stderr: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Toolbox for MockToolbox {
    fn sparse_to_raw(&self, _chunks: &[PathBuf], output: &Path) -> Result<()> {
        self.record(Call::SparseToRaw)?;
        fs::write(output, b"raw super")?;
        Ok(())
    }

    fn lp_unpack(&self, _image: &Path, out_dir: &Path) -> Result<()> {
        self.record(Call::LpUnpack)?;
        for (name, size) in &self.super_images {
            sized_file(&out_dir.join(format!("{name}.img")), *size);
        }
        Ok(())
    }

    fn lp_make(&self, spec: &ContainerSpec, output: &Path) -> Result<()> {
        self.specs.borrow_mut().push(spec.clone());
        self.record(Call::LpMake)?;
        fs::write(output, b"rebuilt super")?;
        Ok(())
    }

    fn extract_payload(&self, _payload: &Path, out_dir: &Path) -> Result<()> {
        if let Some(cancel) = &self.cancel_during_payload {
            cancel.cancel();
            return Err(Error::Cancelled);
        }
        self.record(Call::ExtractPayload)?;
        for (name, size) in &self.payload_images {
            sized_file(&out_dir.join(format!("{name}.img")), *size);
        }
        Ok(())
    }

    fn fetch_platform_tools(&self, dest: &Path) -> Result<()> {
        self.record(Call::FetchPlatformTools)?;
        let dir = dest.join("platform-tools");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("fastboot.exe"), b"MZ")?;
        Ok(())
    }
}

/// Create a file of `size` bytes without writing them
pub fn sized_file(path: &Path, size: u64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(path).unwrap().set_len(size).unwrap();
}

/// A temp directory laid out as `rom/` (input), `out/` and `work/`
pub struct Scenario {
    pub dir: TempDir,
}

impl Scenario {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("rom")).unwrap();
        Self { dir }
    }

    pub fn rom(&self) -> PathBuf {
        self.dir.path().join("rom")
    }

    pub fn out(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    pub fn work_root(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    /// Add a file under the ROM directory
    pub fn add(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.rom().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    /// Add a sized (sparse on disk) file under the ROM directory
    pub fn add_sized(&self, relative: &str, size: u64) -> PathBuf {
        let path = self.rom().join(relative);
        sized_file(&path, size);
        path
    }

    pub fn config(&self) -> ForgeConfig {
        ForgeConfig::default().with_work_root(self.work_root())
    }

    /// Whether every job working directory has been removed
    pub fn work_is_clean(&self) -> bool {
        match fs::read_dir(self.work_root()) {
            Ok(entries) => entries.count() == 0,
            Err(_) => true,
        }
    }
}

/// Names of the entries in a zip archive
pub fn zip_entries(path: &Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    archive.file_names().map(String::from).collect()
}

/// Contents of one zip entry as text
pub fn zip_text(path: &Path, name: &str) -> String {
    use std::io::Read;
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut text = String::new();
    archive.by_name(name).unwrap().read_to_string(&mut text).unwrap();
    text
}

/// Uncompressed size of one zip entry
pub fn zip_entry_size(path: &Path, name: &str) -> u64 {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    archive.by_name(name).unwrap().size()
}
