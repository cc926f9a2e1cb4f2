use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::tags::Tag;

/// Terminal failure of one load attempt. Stored on the picture and handed
/// back on every `await_ready` until the picture is unloaded or reloaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("{}: {message}", path.display())]
    Io { path: PathBuf, message: String },
    #[error("{}: decode failed: {message}", path.display())]
    Decode { path: PathBuf, message: String },
}

impl LoadError {
    pub fn io(path: &Path, err: impl std::fmt::Display) -> Self {
        LoadError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    pub fn decode(path: &Path, err: impl std::fmt::Display) -> Self {
        LoadError::Decode {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("{value:?}: illegal value for {tag}")]
    InvalidTagValue { tag: Tag, value: String },
    #[error("{}: failed to write tags: {message}", path.display())]
    StoreWrite { path: PathBuf, message: String },
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl TagError {
    pub fn store_write(path: &Path, err: impl std::fmt::Display) -> Self {
        TagError::StoreWrite {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}
