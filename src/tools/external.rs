// src/tools/external.rs

//! Process-backed providers

use super::Toolbox;
use super::platform::fetch_platform_tools;
use super::process::{ProcessRunner, log_elapsed};
use crate::config::{ForgeConfig, PlatformToolsConfig, ToolPaths};
use crate::container::ContainerSpec;
use crate::error::{Error, Result};
use crate::job::CancelToken;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;

/// Resolution result for one provider binary
#[derive(Debug, Clone)]
pub struct ToolStatus {
    /// Provider name
    pub name: &'static str,
    /// Configured path or bare name
    pub configured: PathBuf,
    /// Where it resolved, if it did
    pub resolved: Option<PathBuf>,
}

/// Providers implemented by running the Android host tools
pub struct ExternalTools {
    paths: ToolPaths,
    platform_tools: PlatformToolsConfig,
    runner: ProcessRunner,
}

impl ExternalTools {
    pub fn new(config: &ForgeConfig, cancel: CancelToken) -> Self {
        let mut runner = ProcessRunner::new(cancel);
        if let Some(secs) = config.tools.timeout_secs {
            runner = runner.with_timeout(Duration::from_secs(secs));
        }
        Self {
            paths: config.tools.clone(),
            platform_tools: config.platform_tools.clone(),
            runner,
        }
    }

    /// Resolve every provider binary without running anything
    pub fn check(&self) -> Vec<ToolStatus> {
        [
            ("simg2img", &self.paths.simg2img),
            ("lpunpack", &self.paths.lpunpack),
            ("lpmake", &self.paths.lpmake),
            ("payload-dumper", &self.paths.payload_dumper),
        ]
        .into_iter()
        .map(|(name, configured)| ToolStatus {
            name,
            configured: configured.clone(),
            resolved: resolve(configured).ok(),
        })
        .collect()
    }

    fn run(&self, tool: &str, configured: &Path, args: Vec<std::ffi::OsString>) -> Result<()> {
        let program = resolve(configured)?;
        let started = Instant::now();
        self.runner.run(tool, &program, args)?;
        log_elapsed(tool, started);
        Ok(())
    }
}

impl Toolbox for ExternalTools {
    fn sparse_to_raw(&self, chunks: &[PathBuf], output: &Path) -> Result<()> {
        info!("Converting {} sparse chunk(s) to {}", chunks.len(), output.display());
        let mut args: Vec<_> = chunks.iter().map(|c| c.as_os_str().to_owned()).collect();
        args.push(output.as_os_str().to_owned());
        self.run("simg2img", &self.paths.simg2img, args)
    }

    fn lp_unpack(&self, image: &Path, out_dir: &Path) -> Result<()> {
        info!("Unpacking {} into {}", image.display(), out_dir.display());
        std::fs::create_dir_all(out_dir)?;
        let args = vec![image.as_os_str().to_owned(), out_dir.as_os_str().to_owned()];
        self.run("lpunpack", &self.paths.lpunpack, args)
    }

    fn lp_make(&self, spec: &ContainerSpec, output: &Path) -> Result<()> {
        info!(
            "Building {} ({} bytes, {} partition(s))",
            output.display(),
            spec.device_size,
            spec.partition_count()
        );
        self.run("lpmake", &self.paths.lpmake, spec.lpmake_args(output))
    }

    fn extract_payload(&self, payload: &Path, out_dir: &Path) -> Result<()> {
        info!("Extracting {} into {}", payload.display(), out_dir.display());
        let args = vec![
            "-o".into(),
            out_dir.as_os_str().to_owned(),
            payload.as_os_str().to_owned(),
        ];
        self.run("payload-dumper", &self.paths.payload_dumper, args)
    }

    fn fetch_platform_tools(&self, dest: &Path) -> Result<()> {
        fetch_platform_tools(&self.platform_tools, dest, self.runner.cancel_token())
    }
}

/// Resolve a configured tool: paths must exist, bare names go through `PATH`
pub fn resolve(configured: &Path) -> Result<PathBuf> {
    let is_bare = configured.components().count() == 1 && !configured.is_absolute();
    if is_bare {
        which::which(configured)
            .map_err(|_| Error::ToolNotFound(configured.display().to_string()))
    } else if configured.exists() {
        Ok(configured.to_path_buf())
    } else {
        Err(Error::ToolNotFound(configured.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bare_name_on_path() {
        assert!(resolve(Path::new("sh")).is_ok());
        assert!(matches!(
            resolve(Path::new("definitely-not-a-real-tool-xyz")),
            Err(Error::ToolNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_explicit_path() {
        assert!(resolve(Path::new("/bin/sh")).is_ok());
        assert!(resolve(Path::new("/nonexistent/bin/lpmake")).is_err());
    }

    #[test]
    fn test_check_reports_every_provider() {
        let tools = ExternalTools::new(&ForgeConfig::default(), CancelToken::new());
        let names: Vec<_> = tools.check().iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["simg2img", "lpunpack", "lpmake", "payload-dumper"]);
    }

    #[test]
    fn test_missing_provider_is_tool_not_found() {
        let mut config = ForgeConfig::default();
        config.tools.lpunpack = PathBuf::from("/nonexistent/lpunpack");
        let tools = ExternalTools::new(&config, CancelToken::new());
        let dir = tempfile::tempdir().unwrap();
        let err = tools
            .lp_unpack(&dir.path().join("super.img"), &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
    }

    #[test]
    fn test_configured_timeout_kills_provider() {
        // `sleep 30 1` stands in for a converter that never finishes
        let mut config = ForgeConfig::default();
        config.tools.simg2img = PathBuf::from("sleep");
        config.tools.timeout_secs = Some(1);
        let tools = ExternalTools::new(&config, CancelToken::new());

        let started = Instant::now();
        let err = tools
            .sparse_to_raw(&[PathBuf::from("30")], Path::new("1"))
            .unwrap_err();
        assert!(matches!(err, Error::ToolFailed { code: -1, .. }));
        assert!(started.elapsed() < Duration::from_secs(20));
    }
}
