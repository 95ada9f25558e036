// src/assemble.rs

//! Package assembly
//!
//! Turns the collected images (and the rebuilt container, for Super
//! packages) into the final artifact:
//!
//! - **Super**: `<name>/` holding the container, every image outside it,
//!   `platform-tools/`, `flash-all.bat` and `INSTRUCTIONS.txt`
//! - **Hybrid** / **Recovery**: `<name>.zip` with the installer under
//!   `META-INF/com/google/android/` and images at the archive root
//!
//! An image whose file is gone is skipped. A package that would hold no
//! images at all is an error.
//!
//! Packages are built in a hidden staging directory inside the output
//! directory and renamed into place once complete. A failed or cancelled
//! assembly leaves nothing behind.

use crate::collect::PartitionSet;
use crate::config::InstallerConfig;
use crate::container::BuiltContainer;
use crate::error::{Error, Result};
use crate::installer::{
    FLASH_ALL_NAME, INSTRUCTIONS_NAME, InstallPlan, UPDATE_BINARY_PATH, UPDATER_SCRIPT_PATH,
    UPDATER_SCRIPT_PLACEHOLDER, render_flash_all, render_instructions, render_update_binary,
};
use crate::job::CancelToken;
use crate::mode::{PackageLayout, PackageMode};
use crate::partition::{PartitionImage, image_file_name};
use crate::payload::move_file;
use crate::tools::Toolbox;
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Entries at or above this size need zip64 records
const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

/// Everything the assembler needs for one package
pub struct AssemblyInput<'a> {
    pub mode: PackageMode,
    /// Base file name, without extension
    pub name: &'a str,
    pub images: &'a PartitionSet,
    /// Rebuilt container (Super packages only)
    pub container: Option<&'a BuiltContainer>,
    pub installer: &'a InstallerConfig,
    pub output_dir: &'a Path,
}

/// A finished package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Package directory or zip file
    pub path: PathBuf,
    /// Partition names written into the package, in flash order
    pub partitions: Vec<String>,
}

/// Assemble the package for `input.mode`
pub fn assemble(toolbox: &dyn Toolbox, input: &AssemblyInput<'_>, cancel: &CancelToken) -> Result<Package> {
    match input.mode.policy().layout {
        PackageLayout::Directory => assemble_directory(toolbox, input, cancel),
        PackageLayout::Zip { compressed } => assemble_zip(input, compressed, cancel),
    }
}

/// Images that will actually go into the package
fn present_images<'a>(images: impl IntoIterator<Item = &'a PartitionImage>) -> Vec<&'a PartitionImage> {
    images
        .into_iter()
        .filter(|image| {
            let present = image.path.is_file();
            if !present {
                debug!("Skipping {}: image not present", image.name);
            }
            present
        })
        .collect()
}

fn assemble_directory(
    toolbox: &dyn Toolbox,
    input: &AssemblyInput<'_>,
    cancel: &CancelToken,
) -> Result<Package> {
    let container = input.container.filter(|c| c.image.is_file());
    let in_container: Vec<&str> = container
        .map(|c| {
            c.spec
                .groups
                .iter()
                .flat_map(|g| g.partitions.iter().map(|p| p.name.as_str()))
                .collect()
        })
        .unwrap_or_default();

    let loose = present_images(
        input
            .images
            .in_flash_order()
            .into_iter()
            .filter(|image| !in_container.contains(&image.name.as_str())),
    );
    if container.is_none() && loose.is_empty() {
        return Err(Error::NoPartitions);
    }

    let staging = staging_dir(input.output_dir, input.name)?;
    let package_dir = staging.path().join(input.name);
    fs::create_dir_all(&package_dir)?;
    info!("Assembling {}", input.output_dir.join(input.name).display());

    let mut partitions = Vec::new();
    for image in &loose {
        cancel.check()?;
        fs::copy(&image.path, package_dir.join(image.file_name()))?;
        partitions.push(image.name.clone());
    }
    if let Some(container) = container {
        cancel.check()?;
        let name = &container.spec.super_name;
        move_file(&container.image, &package_dir.join(image_file_name(name)))?;
        partitions.push(name.clone());
    }

    toolbox.fetch_platform_tools(&package_dir)?;

    let plan = InstallPlan::new(input.mode, partitions.iter().map(String::as_str));
    fs::write(package_dir.join(FLASH_ALL_NAME), render_flash_all(&plan, input.installer))?;
    fs::write(
        package_dir.join(INSTRUCTIONS_NAME),
        render_instructions(input.mode, input.name),
    )?;
    cancel.check()?;

    let target = input.output_dir.join(input.name);
    publish(&package_dir, &target)?;
    Ok(Package {
        path: target,
        partitions: plan.flash_steps().map(|(p, _, _)| p.to_string()).collect(),
    })
}

fn assemble_zip(input: &AssemblyInput<'_>, compressed: bool, cancel: &CancelToken) -> Result<Package> {
    let images = present_images(input.images.in_flash_order());
    if images.is_empty() {
        return Err(Error::NoPartitions);
    }

    let file_name = format!("{}.zip", input.name);
    let staging = staging_dir(input.output_dir, input.name)?;
    let zip_path = staging.path().join(&file_name);
    info!("Assembling {}", input.output_dir.join(&file_name).display());

    let plan = InstallPlan::new(input.mode, images.iter().map(|i| i.name.as_str()));
    let method = if compressed {
        CompressionMethod::Deflated
    } else {
        CompressionMethod::Stored
    };
    let text_options = || SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut writer = ZipWriter::new(File::create(&zip_path)?);
    writer.start_file(UPDATE_BINARY_PATH, text_options().unix_permissions(0o755))?;
    writer.write_all(render_update_binary(&plan).as_bytes())?;
    writer.start_file(UPDATER_SCRIPT_PATH, text_options())?;
    writer.write_all(UPDATER_SCRIPT_PLACEHOLDER.as_bytes())?;
    writer.start_file(INSTRUCTIONS_NAME, text_options())?;
    writer.write_all(render_instructions(input.mode, input.name).as_bytes())?;

    for image in &images {
        cancel.check()?;
        let size = fs::metadata(&image.path)?.len();
        let options = SimpleFileOptions::default()
            .compression_method(method)
            .large_file(size >= ZIP64_THRESHOLD);
        writer.start_file(image.file_name(), options)?;
        let mut reader = BufReader::new(File::open(&image.path)?);
        io::copy(&mut reader, &mut writer)?;
        debug!("Added {} ({} bytes)", image.file_name(), size);
    }
    writer.finish()?;
    cancel.check()?;

    let target = input.output_dir.join(&file_name);
    publish(&zip_path, &target)?;
    Ok(Package {
        path: target,
        partitions: images.iter().map(|i| i.name.clone()).collect(),
    })
}

/// Hidden directory under `output_dir`, removed on drop
fn staging_dir(output_dir: &Path, name: &str) -> Result<TempDir> {
    fs::create_dir_all(output_dir)?;
    let staging = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .tempdir_in(output_dir)?;
    Ok(staging)
}

/// Move a finished package from staging to `target`, replacing an older one
fn publish(staged: &Path, target: &Path) -> Result<()> {
    if target.is_dir() {
        warn!("Replacing existing package {}", target.display());
        fs::remove_dir_all(target)?;
    } else if target.exists() {
        warn!("Replacing existing package {}", target.display());
        fs::remove_file(target)?;
    }
    fs::rename(staged, target)?;
    Ok(())
}
