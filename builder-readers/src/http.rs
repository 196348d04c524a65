use std::{io::Read, time::Duration};

use builder_preprocessor::reader::{PathMeta, ReadContext, ReadError, ReadResult, Reader};
use thiserror::Error;
use tracing::info;

/// Per-request timeout for remote fetches.
const TIMEOUT: Duration = Duration::from_secs(30);

/// Responses larger than this are rejected rather than buffered.
const MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;

/// Reads sources over HTTP(S).
pub struct HttpReader {
    agent: ureq::Agent,
}

impl Default for HttpReader {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpReader {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(TIMEOUT).build(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("server responded with HTTP {status}")]
    Status { status: u16 },

    #[error("request failed: {source}")]
    Transport {
        #[source]
        source: Box<ureq::Transport>,
    },

    #[error("failed to read response body: {source}")]
    Body {
        #[source]
        source: std::io::Error,
    },

    #[error("response exceeds {MAX_RESPONSE_BYTES} bytes")]
    TooLarge,
}

impl Reader for HttpReader {
    fn supports(&self, reference: &str) -> bool {
        (reference.starts_with("http://") || reference.starts_with("https://"))
            && !reference.contains(".git/")
    }

    fn parse_path(&self, reference: &str) -> PathMeta {
        PathMeta::local(reference, directory_of(reference))
    }

    fn read(&self, reference: &str, _ctx: &ReadContext<'_>) -> Result<ReadResult, ReadError> {
        info!(url = reference, "fetching over HTTP");
        let response = self.agent.get(reference).call().map_err(|e| match e {
            ureq::Error::Status(status, _) => HttpError::Status { status },
            ureq::Error::Transport(source) => HttpError::Transport {
                source: Box::new(source),
            },
        })?;

        let mut text = String::new();
        let mut reader = response.into_reader().take(MAX_RESPONSE_BYTES + 1);
        reader
            .read_to_string(&mut text)
            .map_err(|source| HttpError::Body { source })?;
        if text.len() as u64 > MAX_RESPONSE_BYTES {
            return Err(HttpError::TooLarge.into());
        }
        Ok(ReadResult::text(text))
    }
}

/// The URL with its last path segment removed; the base for relative
/// includes found in HTTP-hosted sources.
fn directory_of(url: &str) -> String {
    let query_start = url.find('?').unwrap_or(url.len());
    let without_query = &url[..query_start];
    let Some(scheme_end) = without_query.find("://") else {
        return without_query.to_owned();
    };
    let after_scheme = &without_query[scheme_end + 3..];
    match after_scheme.rfind('/') {
        Some(slash) => without_query[..scheme_end + 3 + slash].to_owned(),
        None => without_query.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_http_and_https() {
        let reader = HttpReader::new();
        assert!(reader.supports("http://host/x.nut"));
        assert!(reader.supports("https://host/x.nut"));
        assert!(!reader.supports("ftp://host/x.nut"));
        assert!(!reader.supports("x.nut"));
        // Git-over-HTTP references belong to the Git reader.
        assert!(!reader.supports("https://host/repo.git/x.nut"));
    }

    #[test]
    fn parse_path_strips_the_file_segment() {
        let reader = HttpReader::new();
        let meta = reader.parse_path("https://host/dir/sub/x.nut");
        assert_eq!(meta.file, "https://host/dir/sub/x.nut");
        assert_eq!(meta.path, "https://host/dir/sub");
    }

    #[test]
    fn parse_path_ignores_the_query_string() {
        let reader = HttpReader::new();
        let meta = reader.parse_path("https://host/dir/x.nut?token=1/2");
        assert_eq!(meta.path, "https://host/dir");
    }

    #[test]
    fn directory_of_a_bare_host_is_the_host() {
        assert_eq!(directory_of("https://host"), "https://host");
    }
}
