//! Remote crontab editing.
//!
//! Only transports with a [`ShellPrompt`] can reach `crontab`; building a
//! [`CrontabManager`] over FTP fails before anything is sent.

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::access::{Access, AccessError, ShellPrompt};

const NO_CRONTAB_MARKER: &str = "no crontab for";

/// Reads and rewrites the crontab of the instance's account.
pub struct CrontabManager<'a> {
    shell: &'a dyn ShellPrompt,
    bin: String,
}

impl<'a> CrontabManager<'a> {
    /// Binds a manager to `access`, using the `crontab` executable at `bin`.
    ///
    /// # Errors
    ///
    /// Returns [`CrontabError::Access`] wrapping
    /// [`AccessError::CapabilityMismatch`] when the transport has no shell.
    pub fn new(access: &'a dyn Access, bin: &str) -> Result<Self, CrontabError> {
        let shell = access.require_shell("crontab")?;
        Ok(Self {
            shell,
            bin: bin.to_owned(),
        })
    }

    /// Returns the current crontab, or an empty string when the account has
    /// none.
    ///
    /// # Errors
    ///
    /// Returns [`CrontabError::CommandFailure`] when `crontab -l` fails for
    /// any other reason.
    pub fn read(&self) -> Result<String, CrontabError> {
        let command = self
            .shell
            .run_command(self.shell.create_command(&self.bin, &["-l"]))?;
        if command.is_success() {
            return Ok(command.stdout().to_owned());
        }
        if command.stderr().contains(NO_CRONTAB_MARKER) {
            debug!("account has no crontab");
            return Ok(String::new());
        }
        Err(CrontabError::CommandFailure {
            operation: "read",
            status_text: command.status_text(),
            stderr: command.stderr().trim().to_owned(),
        })
    }

    /// Replaces the crontab with `content`.
    ///
    /// # Errors
    ///
    /// Returns [`CrontabError::CommandFailure`] when `crontab -` rejects the
    /// table.
    pub fn write(&self, content: &str) -> Result<(), CrontabError> {
        let mut table = content.to_owned();
        if !table.is_empty() && !table.ends_with('\n') {
            table.push('\n');
        }
        let command = self.shell.run_command(
            self.shell
                .create_command(&self.bin, &["-"])
                .with_stdin(table),
        )?;
        if command.is_success() {
            info!("crontab updated");
            return Ok(());
        }
        Err(CrontabError::CommandFailure {
            operation: "write",
            status_text: command.status_text(),
            stderr: command.stderr().trim().to_owned(),
        })
    }

    /// Returns the schedule lines, skipping blanks and comments.
    ///
    /// # Errors
    ///
    /// Propagates [`CrontabManager::read`] failures.
    pub fn entries(&self) -> Result<Vec<String>, CrontabError> {
        Ok(self
            .read()?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_owned)
            .collect())
    }

    /// Appends `line` unless an identical line is already present. Returns
    /// `true` when the table changed.
    ///
    /// # Errors
    ///
    /// Propagates read and write failures.
    pub fn add_line(&self, line: &str) -> Result<bool, CrontabError> {
        let wanted = line.trim();
        let current = self.read()?;
        if current.lines().any(|existing| existing.trim() == wanted) {
            debug!(line = wanted, "crontab line already present");
            return Ok(false);
        }
        let mut table = current;
        if !table.is_empty() && !table.ends_with('\n') {
            table.push('\n');
        }
        table.push_str(wanted);
        table.push('\n');
        self.write(&table)?;
        Ok(true)
    }

    /// Drops every line matching `pattern` and returns how many were
    /// removed. The table is only rewritten when something matched.
    ///
    /// # Errors
    ///
    /// Returns [`CrontabError::Pattern`] for an invalid expression, or
    /// propagates read and write failures.
    pub fn remove_matching(&self, pattern: &str) -> Result<usize, CrontabError> {
        let regex = Regex::new(pattern).map_err(|err| CrontabError::Pattern {
            pattern: pattern.to_owned(),
            message: err.to_string(),
        })?;
        let current = self.read()?;
        let (removed, kept): (Vec<&str>, Vec<&str>) =
            current.lines().partition(|line| regex.is_match(line));
        if removed.is_empty() {
            return Ok(0);
        }
        let mut table = kept.join("\n");
        if !table.is_empty() {
            table.push('\n');
        }
        self.write(&table)?;
        info!(removed = removed.len(), pattern, "removed crontab lines");
        Ok(removed.len())
    }
}

/// Errors raised by [`CrontabManager`].
#[derive(Debug, Error)]
pub enum CrontabError {
    /// Raised when the transport fails or lacks a shell.
    #[error(transparent)]
    Access(#[from] AccessError),
    /// Raised when `crontab` exits non-zero.
    #[error("crontab {operation} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Operation being performed.
        operation: &'static str,
        /// Human readable exit status.
        status_text: String,
        /// Stderr captured from `crontab`.
        stderr: String,
    },
    /// Raised when a removal pattern does not compile.
    #[error("invalid crontab pattern {pattern}: {message}")]
    Pattern {
        /// Offending pattern.
        pattern: String,
        /// Compiler message.
        message: String,
    },
}

#[cfg(test)]
mod tests;
