//! Git wrapper.

use std::collections::BTreeSet;

use camino::Utf8Path;
use regex::Regex;
use tracing::debug;

use super::svn::compile;
use super::{Preview, VcsError, VcsInfo, VcsKind, VersionControl, run, run_checked};
use crate::access::{Access, Command};

/// Markers for merge conflicts in `merge-tree`, `pull`, and porcelain
/// status output, plus the refusal to overwrite local changes.
pub const GIT_CONFLICT_PATTERN: &str = r"(?m)^CONFLICT \(|^(?:UU|AA|DD|AU|UA|DU|UD) |would be overwritten by (?:merge|checkout)|needs merge$";

const DETACHED_HEAD: &str = "HEAD";

const OVERWRITTEN_BY_MERGE: &str =
    "error: Your local changes to the following files would be overwritten by merge:\n";

/// Wraps the `git` client on a target with a shell.
pub struct Git<'a> {
    access: &'a dyn Access,
    bin: String,
    repository_root: String,
    conflicts: Regex,
}

impl<'a> Git<'a> {
    /// Creates a wrapper expecting clones of `repository_root`, the URL of
    /// the `origin` remote.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::Access`] with a capability mismatch when
    /// `access` has no shell, or [`VcsError::Pattern`] if the conflict
    /// expression fails to compile.
    pub fn new(access: &'a dyn Access, bin: &str, repository_root: &str) -> Result<Self, VcsError> {
        access.require_shell("git")?;
        Ok(Self {
            access,
            bin: bin.to_owned(),
            repository_root: repository_root.to_owned(),
            conflicts: compile(GIT_CONFLICT_PATTERN)?,
        })
    }

    fn git(&self, path: &Utf8Path, args: &[&str]) -> Vec<String> {
        let mut argv = vec![String::from("-C"), path.to_string()];
        argv.extend(args.iter().map(|arg| (*arg).to_owned()));
        argv
    }

    fn run_git(&self, path: &Utf8Path, args: &[&str]) -> Result<Command, VcsError> {
        let argv = self.git(path, args);
        let refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        run(self.access, &self.bin, &refs)
    }

    fn checked_git(
        &self,
        operation: &str,
        path: &Utf8Path,
        args: &[&str],
    ) -> Result<Command, VcsError> {
        let argv = self.git(path, args);
        let refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        run_checked(self.access, operation, &self.bin, &refs)
    }

    fn current_reference(&self, path: &Utf8Path) -> Result<String, VcsError> {
        let head = self.checked_git("info", path, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        let branch = head.stdout().trim().to_owned();
        if branch != DETACHED_HEAD {
            return Ok(branch);
        }
        let tag = self.run_git(path, &["describe", "--tags", "--exact-match"])?;
        if tag.is_success() {
            return Ok(tag.stdout().trim().to_owned());
        }
        Ok(branch)
    }

    /// Working tree paths, uncommitted or untracked, that `upstream`
    /// also changes since the merge base.
    fn overwritten_by_merge(
        &self,
        path: &Utf8Path,
        porcelain: &str,
        upstream: &str,
    ) -> Result<Vec<String>, VcsError> {
        let tracked = self.checked_git("preview", path, &["diff", "--name-only", "HEAD"])?;
        let local: BTreeSet<&str> = tracked
            .stdout()
            .lines()
            .chain(porcelain.lines().filter_map(|line| line.strip_prefix("?? ")))
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if local.is_empty() {
            return Ok(Vec::new());
        }
        let range = format!("HEAD...{upstream}");
        let incoming = self.checked_git("preview", path, &["diff", "--name-only", &range])?;
        Ok(incoming
            .stdout()
            .lines()
            .map(str::trim)
            .filter(|file| local.contains(file))
            .map(str::to_owned)
            .collect())
    }
}

impl VersionControl for Git<'_> {
    fn kind(&self) -> VcsKind {
        VcsKind::Git
    }

    fn repository_root(&self) -> &str {
        &self.repository_root
    }

    fn info(&self, path: &Utf8Path) -> Result<VcsInfo, VcsError> {
        let remote = self.checked_git("info", path, &["config", "--get", "remote.origin.url"])?;
        let url = remote.stdout().trim().to_owned();
        if url.is_empty() {
            return Err(VcsError::Info(String::from("remote.origin.url is not set")));
        }
        let branch = self.current_reference(path)?;
        debug!(%path, %url, %branch, "read git info");
        Ok(VcsInfo {
            repository_root: url.clone(),
            url,
            branch,
        })
    }

    fn preview_update(&self, path: &Utf8Path, current: &VcsInfo) -> Result<Preview, VcsError> {
        self.checked_git("fetch", path, &["fetch", "--quiet", "origin"])?;
        let status = self.checked_git(
            "status",
            path,
            &["status", "--porcelain", "--untracked-files=all"],
        )?;
        let mut output = status.stdout().to_owned();

        let upstream = format!("origin/{}", current.branch);
        let has_upstream = current.branch != DETACHED_HEAD
            && self
                .run_git(path, &["rev-parse", "--verify", "--quiet", &upstream])?
                .is_success();
        if !has_upstream {
            return Ok(Preview {
                output,
                incoming: false,
            });
        }

        let range = format!("HEAD..{upstream}");
        let count = self.checked_git("preview", path, &["rev-list", "--count", &range])?;
        let incoming = count.stdout().trim().parse::<u64>().unwrap_or(0) > 0;

        let merge = self.run_git(path, &["merge-tree", "--write-tree", "HEAD", &upstream])?;
        if !merge.is_success() && merge.exit_code() != Some(1) {
            return Err(VcsError::command_failure("merge preview", &merge));
        }
        output.push_str(merge.stdout());
        output.push_str(merge.stderr());
        if incoming && !self.has_conflicts(&output) {
            let overlap = self.overwritten_by_merge(path, status.stdout(), &upstream)?;
            if !overlap.is_empty() {
                output.push_str(OVERWRITTEN_BY_MERGE);
                for file in overlap {
                    output.push('\t');
                    output.push_str(&file);
                    output.push('\n');
                }
            }
        }
        Ok(Preview { output, incoming })
    }

    fn has_conflicts(&self, output: &str) -> bool {
        self.conflicts.is_match(output)
    }

    fn update(&self, path: &Utf8Path) -> Result<(), VcsError> {
        let command = self.run_git(path, &["pull", "--no-edit"])?;
        let output = format!("{}{}", command.stdout(), command.stderr());
        if self.has_conflicts(&output) {
            return Err(VcsError::Conflict {
                path: path.to_path_buf(),
                output,
            });
        }
        if !command.is_success() {
            return Err(VcsError::command_failure("update", &command));
        }
        Ok(())
    }

    fn switch_to(&self, path: &Utf8Path, target: &str) -> Result<(), VcsError> {
        self.checked_git("switch", path, &["fetch", "--all", "--tags"])?;
        self.checked_git("switch", path, &["checkout", target])?;
        Ok(())
    }

    fn revert(&self, path: &Utf8Path) -> Result<(), VcsError> {
        self.checked_git("revert", path, &["reset", "--hard", "--quiet"])?;
        Ok(())
    }

    fn cleanup(&self, path: &Utf8Path) -> Result<(), VcsError> {
        let lock = path.join(".git").join("index.lock");
        run_checked(self.access, "cleanup", "rm", &["-f", lock.as_str()])?;
        Ok(())
    }
}
