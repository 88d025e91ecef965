use std::path::PathBuf;

use nvb_descriptor::DescriptorError;
use nvb_image::{ImageError, Partition};

use crate::config::RunKey;

/// Errors that abort a build run.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Loading, merging, or rewriting a descriptor failed.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// Image assembly or size validation failed.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// The item compiler could not be started or reported failure.
    #[error("item compiler {program} failed: {status}")]
    ExternalTool { program: String, status: String },

    /// One of the two images of a run is missing or malformed.
    #[error("incomplete output for {key}: {partition} image {reason}")]
    IncompleteOutput {
        key: RunKey,
        partition: Partition,
        reason: String,
    },

    /// A run's worker thread panicked.
    #[error("run {0} panicked")]
    RunPanicked(RunKey),

    /// The build configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type BuildResult<T> = Result<T, BuildError>;
