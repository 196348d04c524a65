//! The contract between the driver and pluggable source readers.

use crate::dependencies::DependencyMap;

/// Location metadata for an include reference, as parsed by a reader.
///
/// `file` and `path` become the `__FILE__` and `__PATH__` of the frame the
/// driver pushes for the included source. For Git sources `repo_ref` holds
/// the requested ref and `repo_prefix` the reference up to the repository
/// (e.g. `github:org/repo`), which relative includes inside the repository
/// resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMeta {
    pub file: String,
    pub path: String,
    pub repo_ref: Option<String>,
    pub repo_prefix: Option<String>,
}

impl PathMeta {
    pub fn local(file: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            path: path.into(),
            repo_ref: None,
            repo_prefix: None,
        }
    }
}

/// The text a reader produced, plus the commit it resolved to for sources
/// that have one (Git).
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub text: String,
    pub commit_id: Option<String>,
}

impl ReadResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            commit_id: None,
        }
    }
}

/// Credential material handed through to readers. Each reader consumes the
/// entries it recognizes and ignores the rest.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub github_user: Option<String>,
    pub github_token: Option<String>,
    pub azure_user: Option<String>,
    pub azure_token: Option<String>,
    pub bitbucket_server_addr: Option<String>,
    pub bitbucket_server_user: Option<String>,
    pub bitbucket_server_token: Option<String>,
}

/// Per-read context: the dependency map with pinned commits (readers honor
/// pins for references recorded in it) and credentials.
pub struct ReadContext<'a> {
    pub dependencies: Option<&'a DependencyMap>,
    pub credentials: &'a Credentials,
}

/// Whatever went wrong inside a reader; the driver wraps it into a
/// `SourceReading` error together with the offending reference.
pub type ReadError = Box<dyn std::error::Error + Send + Sync>;

/// A pluggable source fetcher.
pub trait Reader {
    /// Whether this reader recognizes the reference. The registry walks
    /// readers in registration order and the first supporting one wins.
    fn supports(&self, reference: &str) -> bool;

    /// Parses the reference into display and resolution metadata. Only called
    /// for supported references.
    fn parse_path(&self, reference: &str) -> PathMeta;

    /// Fetches the referenced text.
    fn read(&self, reference: &str, ctx: &ReadContext<'_>) -> Result<ReadResult, ReadError>;
}

/// Routes an include reference to the first registered reader that supports
/// it.
#[derive(Default)]
pub struct ReaderRegistry {
    readers: Vec<Box<dyn Reader>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, reader: impl Reader + 'static) {
        self.readers.push(Box::new(reader));
    }

    pub fn position(&self, reference: &str) -> Option<usize> {
        self.readers
            .iter()
            .position(|reader| reader.supports(reference))
    }

    pub fn get(&self, index: usize) -> &dyn Reader {
        self.readers[index].as_ref()
    }
}
