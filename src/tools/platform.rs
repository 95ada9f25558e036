// src/tools/platform.rs

//! Platform flashing tools bundled into Super packages

use super::PLATFORM_TOOLS_DIR;
use crate::bundle::{copy_dir_all, extract_zip};
use crate::config::PlatformToolsConfig;
use crate::error::{Error, Result};
use crate::job::CancelToken;
use reqwest::blocking::Client;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default timeout for the platform-tools request
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Download attempts before giving up
const MAX_RETRIES: u32 = 3;

/// Bytes read between cancellation checks while downloading
const CHUNK_SIZE: usize = 256 * 1024;

/// Place a `platform-tools/` directory inside `dest`
///
/// A configured local directory is copied verbatim; otherwise the zip is
/// downloaded and unpacked (the archive carries its own `platform-tools/`
/// top-level directory). `cancel` is honoured between retries, while the
/// body streams in, and between archive entries.
pub fn fetch_platform_tools(
    config: &PlatformToolsConfig,
    dest: &Path,
    cancel: &CancelToken,
) -> Result<()> {
    cancel.check()?;
    let target = dest.join(PLATFORM_TOOLS_DIR);

    if let Some(local) = &config.local_dir {
        if !local.is_dir() {
            return Err(Error::Config(format!(
                "platform_tools.local_dir is not a directory: {}",
                local.display()
            )));
        }
        info!("Copying platform-tools from {}", local.display());
        return copy_dir_all(local, &target);
    }

    info!("Downloading platform-tools from {}", config.url);
    let mut file = download(&config.url, cancel)?;
    file.seek(SeekFrom::Start(0))?;
    extract_zip(file, dest, cancel)?;

    if !target.is_dir() {
        return Err(Error::Download(format!(
            "{} did not contain a {}/ directory",
            config.url, PLATFORM_TOOLS_DIR
        )));
    }
    Ok(())
}

/// Stream `url` into an anonymous temp file, retrying transient failures
fn download(url: &str, cancel: &CancelToken) -> Result<std::fs::File> {
    let client = Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| Error::Download(format!("failed to create HTTP client: {e}")))?;

    let mut attempt = 0;
    loop {
        cancel.check()?;
        attempt += 1;
        match try_download(&client, url, cancel) {
            Ok(file) => return Ok(file),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) if attempt < MAX_RETRIES => {
                warn!("Download attempt {}/{} failed: {}", attempt, MAX_RETRIES, e);
                std::thread::sleep(Duration::from_secs(u64::from(attempt)));
            }
            Err(e) => return Err(e),
        }
    }
}

fn try_download(client: &Client, url: &str, cancel: &CancelToken) -> Result<std::fs::File> {
    let mut response = client
        .get(url)
        .send()
        .map_err(|e| Error::Download(format!("{url}: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::Download(format!("{url}: HTTP {}", response.status())));
    }

    let mut file = tempfile::tempfile()?;
    let bytes = copy_cancellable(&mut response, &mut file, cancel)
        .map_err(|e| match e {
            Error::Cancelled => Error::Cancelled,
            other => Error::Download(format!("{url}: {other}")),
        })?;
    info!("Downloaded {} bytes", bytes);
    Ok(file)
}

/// Copy `reader` into `writer` in chunks, stopping when `cancel` is set
fn copy_cancellable<R: Read, W: Write>(reader: &mut R, writer: &mut W, cancel: &CancelToken) -> Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        cancel.check()?;
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(total);
        }
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}
