//! Subversion wrapper.

use camino::Utf8Path;
use regex::Regex;
use tracing::debug;

use super::{Preview, VcsError, VcsInfo, VcsKind, VersionControl, run, run_checked};
use crate::access::Access;

/// Markers `svn` prints for text, property, and tree conflicts in update
/// and merge output.
pub const SVN_CONFLICT_PATTERN: &str =
    r"(?m)(?i:summary of conflicts:)|^\s*(?i:text|property|tree) conflicts:|^\s{0,3}C\s+\S";

const NON_INTERACTIVE: &str = "--non-interactive";

/// Wraps the `svn` client on a target with a shell.
pub struct Svn<'a> {
    access: &'a dyn Access,
    bin: String,
    repository_root: String,
    conflicts: Regex,
    url_tag: Regex,
    root_tag: Regex,
}

impl<'a> Svn<'a> {
    /// Creates a wrapper expecting working copies of `repository_root`.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::Access`] with a capability mismatch when
    /// `access` has no shell, or [`VcsError::Pattern`] if a built-in
    /// expression fails to compile.
    pub fn new(access: &'a dyn Access, bin: &str, repository_root: &str) -> Result<Self, VcsError> {
        access.require_shell("svn")?;
        Ok(Self {
            access,
            bin: bin.to_owned(),
            repository_root: repository_root.trim_end_matches('/').to_owned(),
            conflicts: compile(SVN_CONFLICT_PATTERN)?,
            url_tag: compile(r"<url>([^<]*)</url>")?,
            root_tag: compile(r"<root>([^<]*)</root>")?,
        })
    }

    fn tag_value(pattern: &Regex, xml: &str, tag: &str) -> Result<String, VcsError> {
        pattern
            .captures(xml)
            .and_then(|captures| captures.get(1))
            .map(|value| unescape_xml(value.as_str().trim()))
            .ok_or_else(|| VcsError::Info(format!("svn info output has no <{tag}> element")))
    }
}

impl VersionControl for Svn<'_> {
    fn kind(&self) -> VcsKind {
        VcsKind::Svn
    }

    fn repository_root(&self) -> &str {
        &self.repository_root
    }

    fn info(&self, path: &Utf8Path) -> Result<VcsInfo, VcsError> {
        let command = run_checked(
            self.access,
            "info",
            &self.bin,
            &["info", "--xml", NON_INTERACTIVE, path.as_str()],
        )?;
        let xml = command.stdout();
        let url = Self::tag_value(&self.url_tag, xml, "url")?;
        let repository_root = Self::tag_value(&self.root_tag, xml, "root")?;
        let branch = url
            .strip_prefix(repository_root.as_str())
            .unwrap_or(url.as_str())
            .trim_matches('/')
            .to_owned();
        debug!(%path, %url, %branch, "read svn info");
        Ok(VcsInfo {
            url,
            repository_root,
            branch,
        })
    }

    fn preview_update(&self, path: &Utf8Path, _current: &VcsInfo) -> Result<Preview, VcsError> {
        let command = run(
            self.access,
            &self.bin,
            &[
                "merge",
                "--dry-run",
                NON_INTERACTIVE,
                "-r",
                "BASE:HEAD",
                path.as_str(),
                path.as_str(),
            ],
        )?;
        let output = format!("{}{}", command.stdout(), command.stderr());
        if !command.is_success() && !self.has_conflicts(&output) {
            return Err(VcsError::command_failure("merge preview", &command));
        }
        Ok(Preview {
            incoming: !command.stdout().trim().is_empty(),
            output,
        })
    }

    fn has_conflicts(&self, output: &str) -> bool {
        self.conflicts.is_match(output)
    }

    fn update(&self, path: &Utf8Path) -> Result<(), VcsError> {
        let command = run(
            self.access,
            &self.bin,
            &["update", NON_INTERACTIVE, "--accept", "postpone", path.as_str()],
        )?;
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
        let url = format!("{}/{}", self.repository_root, target.trim_matches('/'));
        run_checked(
            self.access,
            "switch",
            &self.bin,
            &["switch", "--ignore-ancestry", NON_INTERACTIVE, &url, path.as_str()],
        )?;
        Ok(())
    }

    fn revert(&self, path: &Utf8Path) -> Result<(), VcsError> {
        run_checked(
            self.access,
            "revert",
            &self.bin,
            &["revert", "--recursive", NON_INTERACTIVE, path.as_str()],
        )?;
        Ok(())
    }

    fn cleanup(&self, path: &Utf8Path) -> Result<(), VcsError> {
        run_checked(
            self.access,
            "cleanup",
            &self.bin,
            &["cleanup", NON_INTERACTIVE, path.as_str()],
        )?;
        Ok(())
    }
}

pub(super) fn compile(pattern: &str) -> Result<Regex, VcsError> {
    Regex::new(pattern).map_err(|err| VcsError::Pattern(err.to_string()))
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
