//! Lazy local tree walk producing content hashes.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use camino::Utf8Path;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::{ChecksumError, FileChecksum, IgnorePattern};

const READ_BUFFER_LEN: usize = 8192;

type EntryIter = Box<dyn Iterator<Item = walkdir::Result<DirEntry>>>;

/// Iterator over the regular, readable files below a root.
///
/// Entries whose relative path matches the ignore pattern are pruned,
/// including whole directories. Unreadable files and walk errors below
/// the root are logged and skipped.
pub struct ChecksumWalk {
    root: PathBuf,
    entries: EntryIter,
}

/// Starts a checksum walk of `root`.
///
/// Files are visited in lexical order so repeated walks of an unchanged
/// tree yield identical sequences.
///
/// # Errors
///
/// Returns [`ChecksumError::Root`] when `root` is missing, is not a
/// directory, or cannot be listed.
pub fn checksum_folder(
    root: &Utf8Path,
    ignore: &IgnorePattern,
) -> Result<ChecksumWalk, ChecksumError> {
    let root_error = |message: String| ChecksumError::Root {
        path: root.to_string(),
        message,
    };
    let metadata = std::fs::metadata(root).map_err(|err| root_error(err.to_string()))?;
    if !metadata.is_dir() {
        return Err(root_error(String::from("not a directory")));
    }
    std::fs::read_dir(root).map_err(|err| root_error(err.to_string()))?;

    let base = root.as_std_path().to_path_buf();
    let prune_base = base.clone();
    let pattern = ignore.clone();
    let entries = WalkDir::new(&base)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| {
            entry.depth() == 0
                || relative_path(&prune_base, entry.path())
                    .is_none_or(|relative| !pattern.is_ignored(&relative))
        });
    debug!(%root, "starting checksum walk");
    Ok(ChecksumWalk {
        root: base,
        entries: Box::new(entries),
    })
}

impl Iterator for ChecksumWalk {
    type Item = FileChecksum;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(path) = relative_path(&self.root, entry.path()) else {
                warn!(path = %entry.path().display(), "skipping path that is not valid UTF-8");
                continue;
            };
            match hash_file(entry.path()) {
                Ok(hash) => return Some(FileChecksum { hash, path }),
                Err(err) => warn!(%path, error = %err, "skipping unreadable file"),
            }
        }
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

/// Hex MD5 digest of a file's content.
///
/// # Errors
///
/// Returns the underlying I/O error when the file cannot be read.
pub(crate) fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = [0_u8; READ_BUFFER_LEN];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.consume(buffer.get(..read).unwrap_or_default());
    }
    Ok(format!("{:x}", context.finalize()))
}
