//! The dependency map: pinning remote include references to commits.
//!
//! The map is keyed by the include reference and holds the commit each
//! reference resolved to. When a map is supplied to the driver, Git reads are
//! pinned to the recorded commits; when recording is enabled, references not
//! yet in the map record the commit they resolved to. Saving writes the
//! union of the map's prior contents and the newly recorded pins, so a
//! pinned build stays reproducible even as remote heads move.

use std::{collections::BTreeMap, fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current dependency file format version.
pub const DEPENDENCIES_VERSION: u32 = 1;

/// A mapping from include reference to the concrete commit it is pinned to.
/// `BTreeMap` keeps the serialized form stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyMap {
    version: u32,
    pins: BTreeMap<String, String>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self {
            version: DEPENDENCIES_VERSION,
            pins: BTreeMap::new(),
        }
    }

    pub fn get(&self, reference: &str) -> Option<&str> {
        self.pins.get(reference).map(String::as_str)
    }

    pub fn insert(&mut self, reference: impl Into<String>, commit_id: impl Into<String>) {
        self.pins.insert(reference.into(), commit_id.into());
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pins
            .iter()
            .map(|(reference, commit)| (reference.as_str(), commit.as_str()))
    }

    /// Loads a dependency map. Returns `Ok(None)` if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Option<Self>, DependencyMapError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DependencyMapError::Read(e)),
        };
        let map: DependencyMap =
            serde_json::from_str(&content).map_err(DependencyMapError::Parse)?;
        if map.version != DEPENDENCIES_VERSION {
            return Err(DependencyMapError::UnsupportedVersion(map.version));
        }
        Ok(Some(map))
    }

    /// Saves the map as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), DependencyMapError> {
        let content = serde_json::to_string_pretty(self).map_err(DependencyMapError::Serialize)?;
        fs::write(path, content).map_err(DependencyMapError::Write)?;
        Ok(())
    }
}

/// Errors that can occur when working with dependency files.
#[derive(Debug, Error)]
pub enum DependencyMapError {
    #[error("failed to read dependency file: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write dependency file: {0}")]
    Write(#[source] io::Error),

    #[error("failed to parse dependency file: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("failed to serialize dependency file: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("unsupported dependency file version {0}, expected {DEPENDENCIES_VERSION}")]
    UnsupportedVersion(u32),
}
