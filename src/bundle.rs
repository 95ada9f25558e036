// src/bundle.rs

//! Unpacking the input ROM into the job's working directory
//!
//! Accepted inputs:
//! - `.zip` archives (the usual fastboot/OTA ROM packaging)
//! - `.tar`, `.tar.gz`, `.tgz` archives
//! - a bare image or `payload.bin`, copied in as-is
//! - an already-extracted directory, copied recursively
//!
//! Everything lands in one bundle directory so later steps can freely add
//! and remove files without touching the caller's input.

use crate::error::{Error, Result};
use crate::job::CancelToken;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek};
use std::path::{Component, Path};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Input packaging, decided from the file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Zip,
    Tar,
    TarGz,
    /// Single image or payload file
    Image,
    Directory,
}

impl InputKind {
    /// Classify an input path
    pub fn of(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Ok(Self::Directory);
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_lowercase();

        if name.ends_with(".zip") {
            Ok(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else if name.ends_with(".tar") {
            Ok(Self::Tar)
        } else if name.ends_with(".img") || name.ends_with(".bin") || name.contains("sparsechunk") {
            Ok(Self::Image)
        } else {
            Err(Error::UnsupportedInput(format!(
                "{} (expected .zip, .tar, .tar.gz, .tgz, .img, .bin, or a directory)",
                path.display()
            )))
        }
    }
}

/// Unpack `input` into `bundle_dir`
pub fn unpack_input(input: &Path, bundle_dir: &Path, cancel: &CancelToken) -> Result<InputKind> {
    if !input.exists() {
        return Err(Error::MissingInput(input.to_path_buf()));
    }

    let kind = InputKind::of(input)?;
    info!("Unpacking {} ({:?})", input.display(), kind);
    fs::create_dir_all(bundle_dir)?;

    match kind {
        InputKind::Zip => {
            let file = BufReader::new(File::open(input)?);
            extract_zip(file, bundle_dir, cancel)?;
        }
        InputKind::Tar => extract_tar(File::open(input)?, bundle_dir, cancel)?,
        InputKind::TarGz => extract_tar(GzDecoder::new(File::open(input)?), bundle_dir, cancel)?,
        InputKind::Image => {
            let name = input
                .file_name()
                .ok_or_else(|| Error::UnsupportedInput(input.display().to_string()))?;
            fs::copy(input, bundle_dir.join(name))?;
        }
        InputKind::Directory => copy_dir_all(input, bundle_dir)?,
    }

    Ok(kind)
}

/// Extract every safe entry of a zip archive below `dest`
pub fn extract_zip<R: Read + Seek>(reader: R, dest: &Path, cancel: &CancelToken) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut extracted = 0;

    for i in 0..archive.len() {
        cancel.check()?;
        let mut entry = archive.by_index(i)?;
        let Some(entry_path) = entry.enclosed_name() else {
            warn!("Skipping unsafe zip entry: {}", entry.name());
            continue;
        };
        let output_path = dest.join(entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&output_path)?;
            continue;
        }

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&output_path)?;
        std::io::copy(&mut entry, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&output_path, fs::Permissions::from_mode(mode & 0o777))?;
        }

        extracted += 1;
    }

    debug!("Extracted {} zip entries into {}", extracted, dest.display());
    Ok(extracted)
}

/// Extract every safe entry of a tar stream below `dest`
fn extract_tar<R: Read>(reader: R, dest: &Path, cancel: &CancelToken) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        cancel.check()?;
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        if !is_safe_relative(&path) {
            warn!("Skipping unsafe tar entry: {}", path.display());
            continue;
        }
        entry.unpack_in(dest)?;
    }
    Ok(())
}

/// Copy a directory tree, preserving relative layout
pub fn copy_dir_all(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn is_safe_relative(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_input_kind() {
        assert_eq!(InputKind::of(Path::new("rom.zip")).unwrap(), InputKind::Zip);
        assert_eq!(InputKind::of(Path::new("rom.tar.gz")).unwrap(), InputKind::TarGz);
        assert_eq!(InputKind::of(Path::new("rom.tgz")).unwrap(), InputKind::TarGz);
        assert_eq!(InputKind::of(Path::new("rom.tar")).unwrap(), InputKind::Tar);
        assert_eq!(InputKind::of(Path::new("payload.bin")).unwrap(), InputKind::Image);
        assert_eq!(InputKind::of(Path::new("super.img")).unwrap(), InputKind::Image);
        assert!(InputKind::of(Path::new("rom.rar")).is_err());
    }

    #[test]
    fn test_extract_zip_nested() {
        let dir = tempfile::tempdir().unwrap();
        let data = zip_bytes(&[("images/boot.img", b"boot"), ("payload.bin", b"CrAU")]);
        let n = extract_zip(Cursor::new(data), dir.path(), &CancelToken::new()).unwrap();
        assert_eq!(n, 2);
        assert_eq!(fs::read(dir.path().join("images/boot.img")).unwrap(), b"boot");
        assert!(dir.path().join("payload.bin").exists());
    }

    #[test]
    fn test_extract_zip_skips_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dest");
        fs::create_dir_all(&dest).unwrap();
        let data = zip_bytes(&[("../evil.img", b"x"), ("ok.img", b"y")]);
        let n = extract_zip(Cursor::new(data), &dest, &CancelToken::new()).unwrap();
        assert_eq!(n, 1);
        assert!(!dir.path().join("evil.img").exists());
        assert!(dest.join("ok.img").exists());
    }

    #[test]
    fn test_unpack_tar_gz() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("rom.tar.gz");
        {
            let gz = flate2::write::GzEncoder::new(
                File::create(&archive).unwrap(),
                flate2::Compression::fast(),
            );
            let mut builder = tar::Builder::new(gz);
            let mut header = tar::Header::new_gnu();
            header.set_size(4);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "rom/boot.img", &b"boot"[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let bundle = dir.path().join("bundle");
        let kind = unpack_input(&archive, &bundle, &CancelToken::new()).unwrap();
        assert_eq!(kind, InputKind::TarGz);
        assert_eq!(fs::read(bundle.join("rom/boot.img")).unwrap(), b"boot");
    }

    #[test]
    fn test_unpack_bare_image_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("payload.bin");
        fs::write(&payload, b"CrAU").unwrap();

        let bundle = dir.path().join("bundle1");
        unpack_input(&payload, &bundle, &CancelToken::new()).unwrap();
        assert!(bundle.join("payload.bin").exists());

        let src = dir.path().join("extracted");
        fs::create_dir_all(src.join("images")).unwrap();
        fs::write(src.join("images/dtbo.img"), b"dtbo").unwrap();
        let bundle2 = dir.path().join("bundle2");
        let kind = unpack_input(&src, &bundle2, &CancelToken::new()).unwrap();
        assert_eq!(kind, InputKind::Directory);
        assert!(bundle2.join("images/dtbo.img").exists());
    }

    #[test]
    fn test_unpack_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = unpack_input(Path::new("/nonexistent/rom.zip"), dir.path(), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::MissingInput(_)));
    }
}
