//! Partition of a snapshot against a baseline.

use super::ChecksumMap;

/// Drift between a baseline and a snapshot.
///
/// Every path of either side lands in exactly one of the four maps.
/// Modified entries carry the snapshot's hash; deleted entries carry the
/// baseline's.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiffResult {
    /// Present in the snapshot only.
    pub new: ChecksumMap,
    /// Present in both with different hashes.
    pub modified: ChecksumMap,
    /// Present in the baseline only.
    pub deleted: ChecksumMap,
    /// Present in both with identical hashes.
    pub pristine: ChecksumMap,
}

/// Entry counts of a [`DiffResult`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DiffSummary {
    /// Number of new paths.
    pub new: usize,
    /// Number of modified paths.
    pub modified: usize,
    /// Number of deleted paths.
    pub deleted: usize,
    /// Number of unchanged paths.
    pub pristine: usize,
}

impl DiffResult {
    /// Returns `true` when nothing was added, modified, or deleted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Counts entries per partition.
    #[must_use]
    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            new: self.new.len(),
            modified: self.modified.len(),
            deleted: self.deleted.len(),
            pristine: self.pristine.len(),
        }
    }

    /// Renders drift as `A`, `M`, and `D` lines ordered by path.
    #[must_use]
    pub fn change_lines(&self) -> Vec<String> {
        let mut lines: Vec<(&str, char)> = self
            .new
            .keys()
            .map(|path| (path.as_str(), 'A'))
            .chain(self.modified.keys().map(|path| (path.as_str(), 'M')))
            .chain(self.deleted.keys().map(|path| (path.as_str(), 'D')))
            .collect();
        lines.sort_unstable();
        lines
            .into_iter()
            .map(|(path, marker)| format!("{marker} {path}"))
            .collect()
    }
}

/// Partitions `snapshot` against `baseline`.
#[must_use]
pub fn diff(baseline: &ChecksumMap, snapshot: &ChecksumMap) -> DiffResult {
    let mut result = DiffResult::default();
    for (path, hash) in snapshot {
        match baseline.get(path) {
            None => {
                result.new.insert(path.clone(), hash.clone());
            }
            Some(expected) if expected == hash => {
                result.pristine.insert(path.clone(), hash.clone());
            }
            Some(_) => {
                result.modified.insert(path.clone(), hash.clone());
            }
        }
    }
    for (path, hash) in baseline {
        if !snapshot.contains_key(path) {
            result.deleted.insert(path.clone(), hash.clone());
        }
    }
    result
}
