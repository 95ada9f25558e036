// src/metadata.rs

//! ROM metadata used for output naming
//!
//! Codename and version come from the first `build.prop` that carries
//! build or product keys, or from the OTA metadata file when the build
//! properties live inside a partition image.

use crate::bundle::InputKind;
use crate::error::Result;
use crate::mode::PackageMode;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Files searched for build properties, in order
pub const PROP_SOURCES: &[&str] = &[
    "system/build.prop",
    "system/system/build.prop",
    "META-INF/com/android/metadata",
];

/// Value used for any field that could not be determined
pub const UNKNOWN: &str = "unknown";

/// What we know about a ROM
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RomMetadata {
    pub codename: String,
    pub version: String,
    pub android_version: String,
    pub sdk_version: String,
    pub build_date: String,
    pub fingerprint: String,
}

impl Default for RomMetadata {
    fn default() -> Self {
        Self::from_props(&HashMap::new())
    }
}

impl RomMetadata {
    /// Derive metadata from parsed properties
    pub fn from_props(props: &HashMap<String, String>) -> Self {
        let first = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| props.get(*k).filter(|v| !v.is_empty()))
                .cloned()
                .unwrap_or_else(|| UNKNOWN.to_string())
        };

        let mut version = first(&[
            "ro.build.version.incremental",
            "post-build-incremental",
            "ro.build.id",
            "ro.build.display.id",
        ]);
        if let Some(display) = props.get("ro.build.display.id")
            && let Some(dotted) = dotted_version(display)
        {
            version = dotted.to_string();
        }

        Self {
            codename: first(&["ro.product.device", "ro.product.name", "ro.build.product", "pre-device"]),
            version,
            android_version: first(&["ro.build.version.release"]),
            sdk_version: first(&["ro.build.version.sdk", "post-sdk-level"]),
            build_date: first(&["ro.build.date"]),
            fingerprint: first(&["ro.build.fingerprint", "post-build"]),
        }
    }

    /// Read metadata from an unpacked bundle directory
    pub fn from_dir(dir: &Path) -> Result<Self> {
        for source in PROP_SOURCES {
            let path = dir.join(source);
            if !path.is_file() {
                continue;
            }
            let content = fs::read(&path)?;
            let props = parse_props(&String::from_utf8_lossy(&content));
            if has_build_keys(&props) {
                debug!("Read ROM metadata from {}", path.display());
                return Ok(Self::from_props(&props));
            }
        }
        warn!("No build properties found under {}", dir.display());
        Ok(Self::default())
    }

    /// Read metadata from an input archive or directory without a full unpack
    ///
    /// Only zip archives and directories are inspected; other inputs yield
    /// unknown values.
    pub fn from_input(input: &Path) -> Result<Self> {
        match InputKind::of(input)? {
            InputKind::Directory => Self::from_dir(input),
            InputKind::Zip => {
                let mut archive = zip::ZipArchive::new(File::open(input)?)?;
                for source in PROP_SOURCES {
                    let Ok(mut entry) = archive.by_name(source) else {
                        continue;
                    };
                    let mut content = Vec::new();
                    entry.read_to_end(&mut content)?;
                    let props = parse_props(&String::from_utf8_lossy(&content));
                    if has_build_keys(&props) {
                        return Ok(Self::from_props(&props));
                    }
                }
                warn!("No build properties found in {}", input.display());
                Ok(Self::default())
            }
            other => {
                debug!("Metadata not read from {:?} input", other);
                Ok(Self::default())
            }
        }
    }

    /// `<codename>-<version>`, sanitized for use as a file name
    pub fn base_name(&self) -> String {
        format!("{}-{}", sanitize(&self.codename), sanitize(&self.version))
    }

    /// Output name for a package of the given mode
    pub fn package_name(&self, mode: PackageMode) -> String {
        format!("{}-{}", self.base_name(), mode)
    }
}

/// Parse `key=value` lines, skipping blanks and comments
pub fn parse_props(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Replace anything outside `[A-Za-z0-9_.-]` with `_`
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn has_build_keys(props: &HashMap<String, String>) -> bool {
    props
        .keys()
        .any(|k| k.starts_with("ro.build") || k.starts_with("ro.product") || k.starts_with("pre-device"))
}

/// First `a.b.c.d` number in `text`, else the first `a.b.c`
fn dotted_version(text: &str) -> Option<&str> {
    static FOUR: OnceLock<Option<Regex>> = OnceLock::new();
    static THREE: OnceLock<Option<Regex>> = OnceLock::new();
    let four = FOUR.get_or_init(|| Regex::new(r"\d+\.\d+\.\d+\.\d+").ok());
    let three = THREE.get_or_init(|| Regex::new(r"\d+\.\d+\.\d+").ok());

    [four, three]
        .into_iter()
        .flatten()
        .find_map(|re| re.find(text))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BUILD_PROP: &str = "\
# begin build properties
ro.build.id=UKQ1.231003.002
ro.build.display.id=OS1.0.4.0.UKIMIXM release-keys
ro.build.version.incremental=V816.0.4.0.UKIMIXM
ro.build.version.release=14
ro.build.version.sdk=34
ro.product.device=lisa
ro.product.name=lisa_global
";

    #[test]
    fn test_parse_props() {
        let props = parse_props("a=1\n# c=3\n\nb = two=2 \nnot a prop\n");
        assert_eq!(props.get("a").map(String::as_str), Some("1"));
        assert_eq!(props.get("b").map(String::as_str), Some("two=2"));
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn test_codename_and_dotted_version() {
        let meta = RomMetadata::from_props(&parse_props(BUILD_PROP));
        assert_eq!(meta.codename, "lisa");
        assert_eq!(meta.version, "1.0.4.0");
        assert_eq!(meta.android_version, "14");
        assert_eq!(meta.build_date, UNKNOWN);
        assert_eq!(meta.package_name(PackageMode::Hybrid), "lisa-1.0.4.0-hybrid");
    }

    #[test]
    fn test_version_fallback_chain() {
        let meta = RomMetadata::from_props(&parse_props("ro.build.id=TQ3A\nro.build.product=raven\n"));
        assert_eq!(meta.codename, "raven");
        assert_eq!(meta.version, "TQ3A");

        let meta = RomMetadata::from_props(&parse_props("ro.build.display.id=LineageOS 21.0.3 nightly\n"));
        assert_eq!(meta.version, "21.0.3");
        assert_eq!(meta.codename, UNKNOWN);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Pixel 7/Pro"), "Pixel_7_Pro");
        assert_eq!(sanitize("v1.2-beta_3"), "v1.2-beta_3");
    }

    #[test]
    fn test_from_dir_and_ota_metadata() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(RomMetadata::from_dir(dir.path()).unwrap(), RomMetadata::default());

        let meta_path = dir.path().join("META-INF/com/android/metadata");
        fs::create_dir_all(meta_path.parent().unwrap()).unwrap();
        fs::write(&meta_path, "ota-type=AB\npre-device=cheetah\npost-build-incremental=10817346\n")
            .unwrap();
        let meta = RomMetadata::from_dir(dir.path()).unwrap();
        assert_eq!(meta.base_name(), "cheetah-10817346");

        fs::create_dir_all(dir.path().join("system")).unwrap();
        fs::write(dir.path().join("system/build.prop"), BUILD_PROP).unwrap();
        assert_eq!(RomMetadata::from_dir(dir.path()).unwrap().codename, "lisa");
    }

    #[test]
    fn test_from_zip_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rom.zip");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        writer
            .start_file("system/build.prop", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(BUILD_PROP.as_bytes()).unwrap();
        writer.finish().unwrap();

        let meta = RomMetadata::from_input(&path).unwrap();
        assert_eq!(meta.codename, "lisa");
    }
}
