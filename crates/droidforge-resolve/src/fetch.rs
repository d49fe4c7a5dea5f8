use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::Url;
use tracing::debug;

use crate::error::ResolveError;

/// Retrieves one artifact body. Implementations must be callable from the
/// resolver's worker threads.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError>;
}

/// Blocking HTTP fetcher that follows redirects itself, up to a hop limit.
/// `file://` repository URLs are read from disk.
pub struct HttpFetcher {
    client: Client,
    max_redirects: usize,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration, max_redirects: usize) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .map_err(ResolveError::Client)?;
        Ok(Self {
            client,
            max_redirects,
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        if let Some(path) = url.strip_prefix("file://") {
            let path = PathBuf::from(path);
            let bytes = std::fs::read(&path).map_err(|error| ResolveError::io(&path, error))?;
            return non_empty(url, bytes);
        }

        let mut current = Url::parse(url).map_err(|error| ResolveError::InvalidUrl {
            url: url.to_string(),
            reason: error.to_string(),
        })?;
        for _ in 0..=self.max_redirects {
            let response = self
                .client
                .get(current.clone())
                .send()
                .map_err(|source| ResolveError::Request {
                    url: current.to_string(),
                    source,
                })?;
            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| ResolveError::MissingLocation {
                        url: current.to_string(),
                    })?;
                let next = current.join(location).map_err(|error| ResolveError::InvalidUrl {
                    url: location.to_string(),
                    reason: error.to_string(),
                })?;
                debug!(from = %current, to = %next, "following redirect");
                current = next;
                continue;
            }
            if !status.is_success() {
                return Err(ResolveError::Status {
                    url: current.to_string(),
                    status: status.as_u16(),
                });
            }
            let bytes = response.bytes().map_err(|source| ResolveError::Request {
                url: current.to_string(),
                source,
            })?;
            return non_empty(url, bytes.to_vec());
        }
        Err(ResolveError::TooManyRedirects {
            url: url.to_string(),
            limit: self.max_redirects,
        })
    }
}

fn non_empty(url: &str, bytes: Vec<u8>) -> Result<Vec<u8>, ResolveError> {
    if bytes.is_empty() {
        return Err(ResolveError::EmptyBody {
            url: url.to_string(),
        });
    }
    Ok(bytes)
}
