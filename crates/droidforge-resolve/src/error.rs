use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("io error at '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("http client setup failed: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request to '{url}' failed: {source}")]
    Request {
        url: String,
        source: reqwest::Error,
    },
    #[error("'{url}' answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("redirect from '{url}' carried no location")]
    MissingLocation { url: String },
    #[error("'{url}' redirected more than {limit} times")]
    TooManyRedirects { url: String, limit: usize },
    #[error("'{url}' returned an empty body")]
    EmptyBody { url: String },
    #[error("archive '{path}' is unreadable: {reason}")]
    Archive { path: String, reason: String },
    #[error("failed to read declarations from '{path}': {reason}")]
    Declarations { path: String, reason: String },
}

impl ResolveError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ResolveError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
