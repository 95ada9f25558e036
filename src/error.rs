// src/error.rs

//! Error types shared by every conversion step

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while converting a ROM
#[derive(Error, Debug)]
pub enum Error {
    /// The ROM path given to the job does not exist
    #[error("input not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// The input exists but is not a format we can unpack
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    /// A capability provider binary could not be located
    #[error("required tool not found: {0}")]
    ToolNotFound(String),

    /// A provider process ran and reported failure
    #[error("{tool} failed (exit code {code}): {stderr}")]
    ToolFailed {
        tool: String,
        code: i32,
        stderr: String,
    },

    /// The OTA payload extractor failed; never retried
    #[error("payload extraction failed: {0}")]
    PayloadExtraction(String),

    /// Both the direct and the sparse-conversion unpack attempts failed
    #[error("could not unpack super image: {0}")]
    SuperUnpack(String),

    /// Both the full and the minimal container builds failed
    #[error("could not produce container image: {0}")]
    ContainerBuild(String),

    /// The `system` partition needed for the minimal container is absent or empty
    #[error("could not produce container image: basis partition '{0}' is missing or zero-size")]
    ZeroSizeBasis(String),

    /// Nothing flashable was collected from the bundle
    #[error("no partitions found in the ROM bundle")]
    NoPartitions,

    /// The job was cancelled while running
    #[error("conversion cancelled")]
    Cancelled,

    /// Configuration could not be read or is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Platform-tools download failed
    #[error("download failed: {0}")]
    Download(String),

    /// Zip archive read or write failure
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A fatal error, tagged with the pipeline step that raised it
    #[error("step '{step}' failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Tag an error with the step that produced it
    ///
    /// Already-tagged errors keep their original step.
    pub fn in_step(self, step: &'static str) -> Self {
        match self {
            Self::Step { .. } => self,
            other => Self::Step {
                step,
                source: Box::new(other),
            },
        }
    }

    /// The underlying cause, looking through step tags
    pub fn root(&self) -> &Error {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Name of the failing step, if the error was tagged
    pub fn step(&self) -> Option<&'static str> {
        match self {
            Self::Step { step, .. } => Some(step),
            _ => None,
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        let io = err
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
        Self::Io(io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_step_keeps_first_step() {
        let err = Error::NoPartitions.in_step("assemble").in_step("pipeline");
        assert_eq!(err.step(), Some("assemble"));
        assert!(matches!(err.root(), Error::NoPartitions));
    }

    #[test]
    fn test_step_message_names_cause() {
        let err = Error::PayloadExtraction("corrupt manifest".to_string()).in_step("expand-payload");
        let msg = err.to_string();
        assert!(msg.contains("expand-payload"));
        assert!(msg.contains("corrupt manifest"));
    }
}
