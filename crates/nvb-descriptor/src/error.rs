//! Error types for the descriptor crate.

use std::path::PathBuf;

use nvb_types::ItemId;

/// Errors that can occur while loading, merging, or rewriting descriptors.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// A descriptor or override document is malformed.
    #[error("parse error in {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// The same item identifier is defined more than once across the merged
    /// sources.
    #[error("duplicate item id {id} (defined in {first} and {second})")]
    DuplicateId {
        id: ItemId,
        first: String,
        second: String,
    },

    /// Serializing a descriptor back to text failed.
    #[error("write error: {0}")]
    Write(String),

    /// Reading or writing a descriptor file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DescriptorError {
    /// Create a parse error attributed to a named source.
    pub fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for descriptor results.
pub type DescriptorResult<T> = Result<T, DescriptorError>;
