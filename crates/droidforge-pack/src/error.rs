use std::path::Path;

use crate::signing::SignError;

#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("io error at '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("zip error in '{path}': {reason}")]
    Zip { path: String, reason: String },
    #[error("missing input '{0}'")]
    MissingInput(String),
    #[error("archive '{0}' was not written")]
    OutputMissing(String),
    #[error(transparent)]
    Signing(#[from] SignError),
}

impl PackError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        PackError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn zip(path: &Path, reason: impl ToString) -> Self {
        PackError::Zip {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
