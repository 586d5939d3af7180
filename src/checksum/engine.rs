//! Snapshot, validate, and record baselines through an access.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use super::{
    ChecksumError, ChecksumMap, ChecksumStore, DiffResult, FileChecksum, IgnorePattern, Version,
    checksum_folder, diff, parse_wire, to_map,
};
use crate::access::Access;
use crate::config::FleetConfig;
use crate::instance::AccessType;

const CHECKSUM_HELPER: &str = include_str!("../../assets/checksum_helper.php");

/// Runs the embedded checksum helper for `folder` inside the target
/// environment and parses its wire output.
///
/// # Errors
///
/// Returns [`ChecksumError::Helper`] when the helper cannot be staged, or
/// [`ChecksumError::Access`] when the transport or the helper fails, which
/// includes a missing or unreadable `folder`.
pub fn checksum_remote_folder(
    folder: &Utf8Path,
    access: &dyn Access,
    ignore: &IgnorePattern,
) -> Result<Vec<FileChecksum>, ChecksumError> {
    let mut helper = tempfile::Builder::new()
        .prefix("fleetkeeper-checksum-")
        .suffix(".php")
        .tempfile()
        .map_err(|err| ChecksumError::Helper(err.to_string()))?;
    helper
        .write_all(CHECKSUM_HELPER.as_bytes())
        .map_err(|err| ChecksumError::Helper(err.to_string()))?;
    let helper_path = Utf8PathBuf::from_path_buf(helper.path().to_path_buf())
        .map_err(|path| ChecksumError::Helper(format!("non UTF-8 temp path {}", path.display())))?;

    let target = remote_folder_argument(access, folder);
    let output = access.run_script(&helper_path, &[target.as_str(), ignore.as_str()])?;
    Ok(parse_wire(&output))
}

/// FTP helpers run from the webroot under the web server, whose filesystem
/// view need not match FTP paths; they receive webroot-relative folders.
fn remote_folder_argument(access: &dyn Access, folder: &Utf8Path) -> Utf8PathBuf {
    let instance = access.instance();
    let resolved = instance.resolve(folder);
    if access.transport() != AccessType::Ftp {
        return resolved;
    }
    match resolved.strip_prefix(&instance.webroot) {
        Ok(relative) if relative.as_str().is_empty() => Utf8PathBuf::from("."),
        Ok(relative) => relative.to_path_buf(),
        Err(_) => {
            warn!(%resolved, webroot = %instance.webroot, "folder lies outside the webroot");
            resolved
        }
    }
}

/// Computes snapshots and compares them with stored baselines.
#[derive(Debug)]
pub struct ChecksumEngine {
    store: ChecksumStore,
    ignore: IgnorePattern,
}

impl ChecksumEngine {
    /// Creates an engine over an opened store.
    #[must_use]
    pub const fn new(store: ChecksumStore, ignore: IgnorePattern) -> Self {
        Self { store, ignore }
    }

    /// Opens the store and compiles the ignore pattern named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Store`] or [`ChecksumError::Pattern`].
    pub fn from_config(config: &FleetConfig) -> Result<Self, ChecksumError> {
        let store = ChecksumStore::open(Utf8Path::new(&config.store_path))?;
        let ignore = IgnorePattern::new(&config.checksum_ignore_pattern)?;
        Ok(Self::new(store, ignore))
    }

    /// Shared access to the store.
    #[must_use]
    pub const fn store(&self) -> &ChecksumStore {
        &self.store
    }

    /// Exclusive access to the store for batch writes.
    pub const fn store_mut(&mut self) -> &mut ChecksumStore {
        &mut self.store
    }

    /// Ignore pattern applied to every snapshot.
    #[must_use]
    pub const fn ignore(&self) -> &IgnorePattern {
        &self.ignore
    }

    /// Computes the live checksums of `folder` on the instance behind
    /// `access`.
    ///
    /// Local instances are walked in-process; remote ones run the helper.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Root`] or a transport error when the folder
    /// cannot be read.
    pub fn snapshot(
        &self,
        access: &dyn Access,
        folder: &Utf8Path,
    ) -> Result<ChecksumMap, ChecksumError> {
        if access.transport() == AccessType::Local {
            let root = access.instance().resolve(folder);
            return Ok(to_map(checksum_folder(&root, &self.ignore)?));
        }
        Ok(to_map(checksum_remote_folder(folder, access, &self.ignore)?))
    }

    /// Partitions `snapshot` against the baseline of `version_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::UnknownVersion`] when the version is not
    /// stored.
    pub fn validate(
        &self,
        version_id: i64,
        snapshot: &ChecksumMap,
    ) -> Result<DiffResult, ChecksumError> {
        if self.store.version(version_id)?.is_none() {
            return Err(ChecksumError::UnknownVersion { version_id });
        }
        let baseline = self.store.get_checksums(version_id)?;
        let result = diff(&baseline, snapshot);
        let summary = result.summary();
        info!(
            version = version_id,
            new = summary.new,
            modified = summary.modified,
            deleted = summary.deleted,
            pristine = summary.pristine,
            "validated snapshot"
        );
        Ok(result)
    }

    /// Snapshots the instance's webroot and validates it against
    /// `version_id`.
    ///
    /// # Errors
    ///
    /// See [`Self::snapshot`] and [`Self::validate`].
    pub fn verify_instance(
        &self,
        access: &dyn Access,
        version_id: i64,
    ) -> Result<DiffResult, ChecksumError> {
        let webroot = access.instance().webroot.clone();
        let snapshot = self.snapshot(access, &webroot)?;
        self.validate(version_id, &snapshot)
    }

    /// Registers the instance behind `access`, then creates a version
    /// labelled `label` holding its current webroot checksums.
    ///
    /// # Errors
    ///
    /// See [`Self::snapshot`]; a store failure keeps neither the version
    /// nor any record.
    pub fn record_baseline(
        &mut self,
        access: &dyn Access,
        label: &str,
    ) -> Result<Version, ChecksumError> {
        let webroot = access.instance().webroot.clone();
        let snapshot = self.snapshot(access, &webroot)?;
        self.store.create_baseline(
            access.instance(),
            label,
            snapshot
                .into_iter()
                .map(|(path, hash)| FileChecksum { hash, path }),
        )
    }
}
