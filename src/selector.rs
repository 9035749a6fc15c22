//! Remote file selection by exact name or glob pattern

use crate::error::{Error, Result};
use crate::types::RemoteFileRef;
use globset::{Glob, GlobMatcher};

/// Characters that turn a configured name into a glob pattern
const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Picks the remote files a tick should process
///
/// A configured value without glob metacharacters selects exactly one file
/// by name. Anything else is compiled into a glob (`*.txt`, `export_??.csv`).
#[derive(Clone, Debug)]
pub enum FileSelector {
    /// Single file selected by exact name
    Exact(String),
    /// Any number of files matching a glob
    Pattern(GlobMatcher),
}

impl FileSelector {
    /// Build a selector from the configured `fileName` value
    ///
    /// # Errors
    /// Returns a configuration error if the pattern is not a valid glob
    pub fn new(value: &str) -> Result<Self> {
        if !value.contains(GLOB_META) {
            return Ok(FileSelector::Exact(value.to_string()));
        }

        let glob = Glob::new(value)
            .map_err(|e| Error::config("fileName", format!("invalid pattern '{}': {}", value, e)))?;
        Ok(FileSelector::Pattern(glob.compile_matcher()))
    }

    /// Whether this selector can match more than one file
    pub fn is_pattern(&self) -> bool {
        matches!(self, FileSelector::Pattern(_))
    }

    /// Check a single remote file name
    pub fn matches(&self, name: &str) -> bool {
        match self {
            FileSelector::Exact(expected) => name == expected,
            FileSelector::Pattern(matcher) => matcher.is_match(name),
        }
    }

    /// Filter a listing down to the files this tick should process
    ///
    /// Directories never match. Exact mode yields at most one entry.
    pub fn select(&self, listing: Vec<RemoteFileRef>) -> Vec<RemoteFileRef> {
        let mut selected: Vec<RemoteFileRef> = listing
            .into_iter()
            .filter(|entry| !entry.is_dir && self.matches(&entry.name))
            .collect();

        if !self.is_pattern() {
            selected.truncate(1);
        }
        selected
    }
}

impl std::fmt::Display for FileSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileSelector::Exact(name) => write!(f, "{}", name),
            FileSelector::Pattern(matcher) => write!(f, "{}", matcher.glob()),
        }
    }
}
