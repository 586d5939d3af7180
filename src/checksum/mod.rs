//! File-state reconciliation: folder checksums, stored baselines, and drift.
//!
//! A baseline is the path to hash map recorded for one [`Version`] in the
//! [`ChecksumStore`]. A snapshot is the same shape computed from a live
//! tree, either by walking it locally ([`checksum_folder`]) or by running
//! the embedded helper through an [`crate::access::Access`]
//! ([`checksum_remote_folder`]). [`diff`] partitions the union of both into
//! new, modified, deleted, and pristine paths.

use std::collections::BTreeMap;

use regex::Regex;
use thiserror::Error;

use crate::access::AccessError;
use crate::instance::InstanceError;

mod diff;
mod engine;
mod store;
mod walk;
mod wire;

pub use diff::{DiffResult, DiffSummary, diff};
pub use engine::{ChecksumEngine, checksum_remote_folder};
pub use store::{ChecksumStore, Version};
pub use walk::{ChecksumWalk, checksum_folder};
pub use wire::{parse_wire, render_wire};

/// Paths skipped by default: caches, compiled templates, VCS metadata,
/// the maintenance marker, and transient helpers uploaded by this tool.
pub const DEFAULT_IGNORE_PATTERN: &str = r"(^|/)(temp|templates_c|\.svn|\.git)(/|$)|(^|/)maintenance\.php$|(^|/)\.fleetkeeper-[^/]*\.php$";

/// Map from relative path to content hash.
pub type ChecksumMap = BTreeMap<String, String>;

/// Content hash of one regular file, keyed by its path relative to the
/// walked root.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FileChecksum {
    /// Lowercase hex MD5 digest.
    pub hash: String,
    /// Path relative to the root, `/`-separated.
    pub path: String,
}

impl FileChecksum {
    /// Creates a checksum record.
    #[must_use]
    pub fn new(hash: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            path: path.into(),
        }
    }
}

/// Collects records into a [`ChecksumMap`]; the last record for a path wins.
#[must_use]
pub fn to_map<I>(entries: I) -> ChecksumMap
where
    I: IntoIterator<Item = FileChecksum>,
{
    entries
        .into_iter()
        .map(|entry| (entry.path, entry.hash))
        .collect()
}

/// Compiled ignore pattern matched against `/`-separated relative paths.
#[derive(Clone, Debug)]
pub struct IgnorePattern {
    regex: Regex,
}

impl IgnorePattern {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Pattern`] when the expression is invalid.
    pub fn new(pattern: &str) -> Result<Self, ChecksumError> {
        let regex = Regex::new(pattern).map_err(|err| ChecksumError::Pattern {
            pattern: pattern.to_owned(),
            message: err.to_string(),
        })?;
        Ok(Self { regex })
    }

    /// Returns the default pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Pattern`] if the built-in expression fails
    /// to compile.
    pub fn default_pattern() -> Result<Self, ChecksumError> {
        Self::new(DEFAULT_IGNORE_PATTERN)
    }

    /// Returns `true` when `relative_path` should be skipped.
    #[must_use]
    pub fn is_ignored(&self, relative_path: &str) -> bool {
        self.regex.is_match(relative_path)
    }

    /// Source text of the pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Errors raised while computing, storing, or comparing checksums.
#[derive(Debug, Error)]
pub enum ChecksumError {
    /// Raised when the root of a walk is missing or unreadable.
    #[error("cannot checksum {path}: {message}")]
    Root {
        /// Root that was requested.
        path: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when an ignore pattern does not compile.
    #[error("invalid ignore pattern {pattern}: {message}")]
    Pattern {
        /// Offending pattern.
        pattern: String,
        /// Regex compiler message.
        message: String,
    },
    /// Raised when the remote helper cannot be staged locally.
    #[error("failed to prepare checksum helper: {0}")]
    Helper(String),
    /// Raised when a version id is not present in the store.
    #[error("unknown checksum version {version_id}")]
    UnknownVersion {
        /// Requested version id.
        version_id: i64,
    },
    /// Raised when a version is created for an unregistered instance.
    #[error("unknown instance {instance_id}")]
    UnknownInstance {
        /// Requested instance id.
        instance_id: String,
    },
    /// Raised when a stored instance no longer describes a valid target.
    #[error(transparent)]
    Instance(#[from] InstanceError),
    /// Raised when the store rejects an operation.
    #[error("checksum store error: {0}")]
    Store(#[from] rusqlite::Error),
    /// Raised when the transport fails while producing a remote snapshot.
    #[error(transparent)]
    Access(#[from] AccessError),
}

#[cfg(test)]
mod tests;
