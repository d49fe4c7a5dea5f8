use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("io error at '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("http client setup failed: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to '{url}' failed: {source}")]
    Request {
        url: String,
        source: reqwest::Error,
    },
    #[error("'{url}' answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("local source '{0}' does not exist")]
    LocalSourceMissing(String),
    #[error("unsupported source '{0}'")]
    UnsupportedSource(String),
    #[error("archive '{path}' is unreadable: {reason}")]
    Archive { path: String, reason: String },
    #[error("{component} marker '{marker}' not found after installing into '{dir}'")]
    MarkerMissing {
        component: &'static str,
        marker: &'static str,
        dir: String,
    },
    #[error("no host installation provides {0}")]
    HostUnavailable(&'static str),
    #[error("toolchain install did not finish within {}s", .0.as_secs())]
    InstallTimedOut(std::time::Duration),
    #[error("toolchain install worker stopped without reporting")]
    InstallAborted,
    #[error("toolchain install cancelled")]
    InstallCancelled,
}

impl ToolchainError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ToolchainError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
