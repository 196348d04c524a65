use std::{fs, io, path::PathBuf};

use builder_preprocessor::{
    include,
    reader::{PathMeta, ReadContext, ReadError, ReadResult, Reader},
};
use camino::Utf8Path;
use thiserror::Error;
use tracing::trace;

/// Reads sources from the local filesystem. Accepts any reference that does
/// not name another scheme, so it must be registered last.
#[derive(Debug, Default)]
pub struct LocalReader;

impl LocalReader {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Error)]
pub enum LocalError {
    #[error("cannot read file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Reader for LocalReader {
    fn supports(&self, reference: &str) -> bool {
        !include::has_scheme(reference)
    }

    fn parse_path(&self, reference: &str) -> PathMeta {
        let path = Utf8Path::new(reference);
        let directory = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.as_str(),
            _ => ".",
        };
        PathMeta::local(reference, directory)
    }

    fn read(&self, reference: &str, _ctx: &ReadContext<'_>) -> Result<ReadResult, ReadError> {
        trace!(reference, "reading local file");
        let text = fs::read_to_string(reference).map_err(|source| LocalError::Read {
            path: PathBuf::from(reference),
            source,
        })?;
        Ok(ReadResult::text(text))
    }
}
