//! Working-copy updates for SVN and Git with conflict gating.
//!
//! [`update_instance_to`] drives one working copy through the decision
//! between updating in place and switching to another branch or tag:
//!
//! 1. read working-copy metadata and refuse foreign repositories,
//! 2. preview incoming changes and classify the copy as a [`VcsState`],
//! 3. on conflict, ask a [`ConflictResolver`] to abort or discard local
//!    changes,
//! 4. update or upgrade,
//! 5. always run the tool's cleanup step once step 2 was reached.
//!
//! Conflict detection is text matching on tool output. Each variant keeps
//! its markers in a single regular expression.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::access::{Access, AccessError, Command};
use crate::config::FleetConfig;

mod git;
mod svn;

pub use git::{GIT_CONFLICT_PATTERN, Git};
pub use svn::{SVN_CONFLICT_PATTERN, Svn};

/// Supported version control tools.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum VcsKind {
    /// Subversion.
    Svn,
    /// Git.
    Git,
}

impl VcsKind {
    /// Detects the tool managing `path` from its metadata directory.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::NotAWorkingCopy`] when neither `.svn` nor `.git`
    /// exists below `path`.
    pub fn detect(access: &dyn Access, path: &Utf8Path) -> Result<Self, VcsError> {
        if access.file_exists(&path.join(".svn"))? {
            return Ok(Self::Svn);
        }
        if access.file_exists(&path.join(".git"))? {
            return Ok(Self::Git);
        }
        Err(VcsError::NotAWorkingCopy {
            path: path.to_path_buf(),
        })
    }

    /// Lowercase tool name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Svn => "svn",
            Self::Git => "git",
        }
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Normalised working-copy metadata.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VcsInfo {
    /// URL the working copy tracks.
    pub url: String,
    /// Root of the repository the working copy belongs to.
    pub repository_root: String,
    /// Current branch or tag, relative to the repository root for SVN.
    pub branch: String,
}

/// Classification of a working copy against a target reference.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VcsState {
    /// Already at the target with nothing incoming.
    Clean,
    /// On the target branch with upstream changes to pull.
    NeedsUpdate,
    /// On a different branch or tag than the target.
    NeedsUpgrade,
    /// Pending changes would conflict with local modifications.
    Conflicted,
}

/// Result of previewing incoming changes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Preview {
    /// Raw tool output, shown to the operator on conflict.
    pub output: String,
    /// Whether upstream has changes the working copy lacks.
    pub incoming: bool,
}

/// Conflict details handed to a [`ConflictResolver`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConflictReport {
    /// Tool managing the working copy.
    pub kind: VcsKind,
    /// Working-copy path.
    pub path: Utf8PathBuf,
    /// Raw preview output that matched the conflict markers.
    pub output: String,
}

/// Operator decision on a conflicted working copy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConflictDecision {
    /// Stop without touching the working copy.
    Abort,
    /// Revert local modifications and continue.
    DiscardLocalChanges,
}

/// Decides how to proceed when a preview reports conflicts.
pub trait ConflictResolver {
    /// Returns the decision for `report`.
    fn resolve(&self, report: &ConflictReport) -> ConflictDecision;
}

/// Resolver that always aborts.
#[derive(Clone, Copy, Debug, Default)]
pub struct AbortOnConflict;

impl ConflictResolver for AbortOnConflict {
    fn resolve(&self, _report: &ConflictReport) -> ConflictDecision {
        ConflictDecision::Abort
    }
}

/// Resolver that always discards local changes.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardOnConflict;

impl ConflictResolver for DiscardOnConflict {
    fn resolve(&self, _report: &ConflictReport) -> ConflictDecision {
        ConflictDecision::DiscardLocalChanges
    }
}

/// What [`update_instance_to`] did.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpdateOutcome {
    /// Metadata before the operation.
    pub previous: VcsInfo,
    /// Branch of the state machine that ran: [`VcsState::Clean`],
    /// [`VcsState::NeedsUpdate`], or [`VcsState::NeedsUpgrade`].
    pub action: VcsState,
    /// Whether local modifications were reverted to resolve a conflict.
    pub discarded_local_changes: bool,
}

/// Operations shared by every version control wrapper.
///
/// Implementations build every invocation with
/// [`Access::create_command`], so arguments are escaped once at the
/// transport boundary.
pub trait VersionControl {
    /// Tool behind this wrapper.
    fn kind(&self) -> VcsKind;

    /// Repository root the working copy is expected to belong to.
    fn repository_root(&self) -> &str;

    /// Reads working-copy metadata.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::Info`] when the output cannot be parsed, or
    /// [`VcsError::CommandFailure`] when the tool fails.
    fn info(&self, path: &Utf8Path) -> Result<VcsInfo, VcsError>;

    /// Previews upstream changes against the working copy without
    /// modifying it.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::CommandFailure`] when the preview cannot run.
    fn preview_update(&self, path: &Utf8Path, current: &VcsInfo) -> Result<Preview, VcsError>;

    /// Returns `true` when `output` contains a conflict marker.
    fn has_conflicts(&self, output: &str) -> bool;

    /// Brings the current branch up to date.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::Conflict`] when the tool reports conflicts, or
    /// [`VcsError::CommandFailure`] on any other failure.
    fn update(&self, path: &Utf8Path) -> Result<(), VcsError>;

    /// Moves the working copy to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::CommandFailure`] when the switch fails.
    fn switch_to(&self, path: &Utf8Path, target: &str) -> Result<(), VcsError>;

    /// Discards local modifications.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::CommandFailure`] when the revert fails.
    fn revert(&self, path: &Utf8Path) -> Result<(), VcsError>;

    /// Releases locks left behind by interrupted operations.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::CommandFailure`] when cleanup fails.
    fn cleanup(&self, path: &Utf8Path) -> Result<(), VcsError>;

    /// Reverts local modifications, then switches to `target`.
    ///
    /// # Errors
    ///
    /// See [`Self::revert`] and [`Self::switch_to`].
    fn upgrade(&self, path: &Utf8Path, target: &str) -> Result<(), VcsError> {
        self.revert(path)?;
        self.switch_to(path, target)
    }

    /// Classifies the working copy against `target` from a preview.
    fn classify(&self, current: &VcsInfo, preview: &Preview, target: &str) -> VcsState {
        if self.has_conflicts(&preview.output) {
            VcsState::Conflicted
        } else if !same_reference(&current.branch, target) {
            VcsState::NeedsUpgrade
        } else if preview.incoming {
            VcsState::NeedsUpdate
        } else {
            VcsState::Clean
        }
    }
}

/// Brings the working copy at `path` to `target`, updating in place when
/// it already tracks `target` and switching otherwise.
///
/// A working copy from another repository is rejected before anything
/// runs. Once the preview stage starts, the tool's cleanup step runs on
/// every exit path. When the resolver aborts, the working copy is left as
/// it was.
///
/// # Errors
///
/// Returns [`VcsError::RepositoryMismatch`], [`VcsError::Conflict`] when
/// the resolver aborts, or any error from the underlying steps. A cleanup
/// failure is returned only when the main steps succeeded.
pub fn update_instance_to(
    vcs: &dyn VersionControl,
    resolver: &dyn ConflictResolver,
    path: &Utf8Path,
    target: &str,
) -> Result<UpdateOutcome, VcsError> {
    let previous = vcs.info(path)?;
    if !same_repository(&previous.repository_root, vcs.repository_root()) {
        return Err(VcsError::RepositoryMismatch {
            expected: vcs.repository_root().to_owned(),
            actual: previous.repository_root,
        });
    }

    let result = drive_update(vcs, resolver, path, target, previous);
    let cleanup = vcs.cleanup(path);
    match (result, cleanup) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Err(cleanup_err)) => {
            warn!(%path, error = %cleanup_err, "cleanup failed after error");
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
    }
}

fn drive_update(
    vcs: &dyn VersionControl,
    resolver: &dyn ConflictResolver,
    path: &Utf8Path,
    target: &str,
    previous: VcsInfo,
) -> Result<UpdateOutcome, VcsError> {
    let preview = vcs.preview_update(path, &previous)?;
    let mut state = vcs.classify(&previous, &preview, target);
    info!(
        vcs = %vcs.kind(),
        %path,
        from = %previous.branch,
        to = target,
        ?state,
        "classified working copy"
    );

    let mut discarded_local_changes = false;
    if state == VcsState::Conflicted {
        let report = ConflictReport {
            kind: vcs.kind(),
            path: path.to_path_buf(),
            output: preview.output.clone(),
        };
        match resolver.resolve(&report) {
            ConflictDecision::Abort => {
                info!(%path, "conflict resolution aborted");
                return Err(VcsError::Conflict {
                    path: path.to_path_buf(),
                    output: preview.output,
                });
            }
            ConflictDecision::DiscardLocalChanges => {
                warn!(%path, "discarding local changes to resolve conflict");
                vcs.revert(path)?;
                discarded_local_changes = true;
                state = if same_reference(&previous.branch, target) {
                    VcsState::NeedsUpdate
                } else {
                    VcsState::NeedsUpgrade
                };
            }
        }
    }

    match state {
        VcsState::NeedsUpgrade => vcs.upgrade(path, target)?,
        VcsState::NeedsUpdate => vcs.update(path)?,
        VcsState::Clean | VcsState::Conflicted => {}
    }
    info!(vcs = %vcs.kind(), %path, ?state, "working copy at target");
    Ok(UpdateOutcome {
        previous,
        action: state,
        discarded_local_changes,
    })
}

/// Builds the wrapper for the tool managing `path`.
///
/// # Errors
///
/// Returns [`VcsError::NotAWorkingCopy`] when no tool is detected, or
/// [`VcsError::Access`] with a capability mismatch on transports without a
/// shell.
pub fn open_version_control<'a>(
    access: &'a dyn Access,
    config: &FleetConfig,
    path: &Utf8Path,
    repository_root: &str,
) -> Result<Box<dyn VersionControl + 'a>, VcsError> {
    match VcsKind::detect(access, path)? {
        VcsKind::Svn => Ok(Box::new(Svn::new(access, &config.svn_bin, repository_root)?)),
        VcsKind::Git => Ok(Box::new(Git::new(access, &config.git_bin, repository_root)?)),
    }
}

fn same_repository(left: &str, right: &str) -> bool {
    normalise_url(left) == normalise_url(right)
}

fn same_reference(left: &str, right: &str) -> bool {
    left.trim_matches('/') == right.trim_matches('/')
}

fn normalise_url(url: &str) -> &str {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed.strip_suffix(".git").unwrap_or(trimmed)
}

/// Runs `program` with `args` through `access`.
pub(crate) fn run(access: &dyn Access, program: &str, args: &[&str]) -> Result<Command, VcsError> {
    Ok(access.run_command(access.create_command(program, args))?)
}

/// Runs `program` and maps a non-zero exit to [`VcsError::CommandFailure`].
pub(crate) fn run_checked(
    access: &dyn Access,
    operation: &str,
    program: &str,
    args: &[&str],
) -> Result<Command, VcsError> {
    let command = run(access, program, args)?;
    if command.is_success() {
        return Ok(command);
    }
    Err(VcsError::command_failure(operation, &command))
}

/// Errors raised by version control wrappers.
#[derive(Debug, Error)]
pub enum VcsError {
    /// Raised when the transport fails or lacks a shell.
    #[error(transparent)]
    Access(#[from] AccessError),
    /// Raised when a working copy belongs to a different repository.
    #[error("not the same repository: expected {expected}, found {actual}")]
    RepositoryMismatch {
        /// Configured repository root.
        expected: String,
        /// Root reported by the working copy.
        actual: String,
    },
    /// Raised when conflicts block an update and were not resolved.
    #[error("conflicts in {path}:\n{output}")]
    Conflict {
        /// Working-copy path.
        path: Utf8PathBuf,
        /// Raw tool output.
        output: String,
    },
    /// Raised when a tool invocation exits non-zero.
    #[error("{operation} failed: {program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Logical operation, such as `update` or `switch`.
        operation: String,
        /// Program that failed.
        program: String,
        /// Human readable exit status.
        status_text: String,
        /// Stderr captured from the tool.
        stderr: String,
    },
    /// Raised when working-copy metadata cannot be parsed.
    #[error("cannot read working copy metadata: {0}")]
    Info(String),
    /// Raised when a conflict marker expression fails to compile.
    #[error("invalid conflict pattern: {0}")]
    Pattern(String),
    /// Raised when no supported tool manages a path.
    #[error("{path} is not a working copy")]
    NotAWorkingCopy {
        /// Inspected path.
        path: Utf8PathBuf,
    },
}

impl VcsError {
    fn command_failure(operation: &str, command: &Command) -> Self {
        Self::CommandFailure {
            operation: operation.to_owned(),
            program: command.program().to_owned(),
            status_text: command.status_text(),
            stderr: command.stderr().trim().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests;
