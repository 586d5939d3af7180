//! Uniform remote-execution abstraction over local, SSH, and FTP transports.
//!
//! Every side-effecting operation in the crate (version control, database,
//! checksums, crontab) is expressed as [`Command`]s created and run through
//! an [`Access`]. Transports differ in capability: all of them move files,
//! only [`LocalAccess`] and [`SshAccess`] expose a [`ShellPrompt`]. Callers
//! that need a shell ask for it with [`Access::require_shell`], which fails
//! fast with [`AccessError::CapabilityMismatch`] on FTP.

use camino::Utf8Path;
use tracing::info;

use crate::config::FleetConfig;
use crate::instance::{AccessType, Instance};

mod cleanup;
mod command;
mod error;
mod ftp;
mod local;
mod runner;
mod side_channel;
mod ssh;

pub use command::{Command, CommandOutput};
pub use error::AccessError;
pub use ftp::FtpAccess;
pub use local::LocalAccess;
pub use runner::{CommandRunner, ProcessCommandRunner};
pub use side_channel::{HttpSideChannel, SideChannel};
pub use ssh::SshAccess;

/// Named operation sets an access variant may support.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Capability {
    /// Arbitrary shell lines and interactive tooling (crontab, VCS).
    ShellPrompt,
    /// Upload and download of individual files.
    FileTransfer,
}

/// File movement between the local machine and the target.
pub trait FileTransfer {
    /// Copies `local` to `remote` on the target, preserving executable bits
    /// where the transport carries permission metadata.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Transfer`] when the copy fails.
    fn upload(&self, local: &Utf8Path, remote: &Utf8Path) -> Result<(), AccessError>;

    /// Copies `remote` from the target to `local`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Transfer`] when the copy fails.
    fn download(&self, remote: &Utf8Path, local: &Utf8Path) -> Result<(), AccessError>;
}

/// Transport-specific execution and filesystem queries bound to one
/// [`Instance`].
///
/// Access objects hold per-invocation state and are not shared between
/// threads; operate on several instances by building one access each.
pub trait Access: FileTransfer {
    /// Instance this access is bound to.
    fn instance(&self) -> &Instance;

    /// Capabilities offered by the transport.
    fn capabilities(&self) -> &'static [Capability];

    /// Transport tag of the bound instance.
    fn transport(&self) -> AccessType {
        self.instance().access_type
    }

    /// Returns `true` when the transport offers `capability`.
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Builds an unexecuted command bound to this transport.
    fn create_command(&self, program: &str, args: &[&str]) -> Command {
        Command::new(program).args(args.iter().copied())
    }

    /// Executes `command` in the transport's environment and returns it
    /// populated with exit code, stdout, and stderr.
    ///
    /// A non-zero exit is a normal result, never an error.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::CommandReused`] if `command` already ran, or a
    /// transport error when the command could not be delivered at all.
    fn run_command(&self, command: Command) -> Result<Command, AccessError>;

    /// Runs a local helper script with the instance's interpreter in the
    /// target environment and returns its stdout.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Script`] when the script exits non-zero, or a
    /// transport error when it cannot be placed or executed.
    fn run_script(&self, script: &Utf8Path, args: &[&str]) -> Result<String, AccessError>;

    /// Returns `true` when `path` has no entries other than `.` and `..`.
    /// A missing directory counts as empty.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the listing cannot be obtained.
    fn is_empty_dir(&self, path: &Utf8Path) -> Result<bool, AccessError>;

    /// Returns `true` when `path` exists on the target.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the check cannot be performed.
    fn file_exists(&self, path: &Utf8Path) -> Result<bool, AccessError>;

    /// Returns the shell capability when the transport has one.
    fn as_shell(&self) -> Option<&dyn ShellPrompt> {
        None
    }

    /// Returns the shell capability or fails with
    /// [`AccessError::CapabilityMismatch`] naming `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::CapabilityMismatch`] when the transport lacks
    /// a shell prompt.
    fn require_shell(&self, operation: &str) -> Result<&dyn ShellPrompt, AccessError> {
        self.as_shell()
            .ok_or_else(|| AccessError::CapabilityMismatch {
                operation: operation.to_owned(),
                transport: self.transport(),
            })
    }
}

/// Marker capability for transports that can run opaque shell lines.
pub trait ShellPrompt: Access {
    /// Runs `command_line` through the target's shell and returns stdout,
    /// with stderr folded in when `capture_stderr` is set.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the line cannot be delivered.
    ///
    /// # Security
    ///
    /// `command_line` is passed verbatim to the shell. Quote untrusted
    /// values before calling this method, or prefer
    /// [`Access::create_command`], which escapes each argument.
    fn shell_exec(&self, command_line: &str, capture_stderr: bool) -> Result<String, AccessError>;
}

/// Builds the access object for `instance` and probes connectivity.
///
/// # Errors
///
/// Returns [`AccessError::Connection`] when the target cannot be reached,
/// so failures surface at construction rather than on first use.
pub fn open_access(
    instance: &Instance,
    config: &FleetConfig,
) -> Result<Box<dyn Access>, AccessError> {
    info!(instance = %instance.id, transport = %instance.access_type, "opening access");
    match instance.access_type {
        AccessType::Local => Ok(Box::new(LocalAccess::connect(
            instance.clone(),
            ProcessCommandRunner,
        )?)),
        AccessType::Ssh => Ok(Box::new(SshAccess::connect(
            instance.clone(),
            config.clone(),
            ProcessCommandRunner,
        )?)),
        AccessType::Ftp => {
            let side_channel = HttpSideChannel::new(config.http_timeout_secs)?;
            Ok(Box::new(FtpAccess::connect(
                instance.clone(),
                config.clone(),
                ProcessCommandRunner,
                side_channel,
            )?))
        }
    }
}

pub(crate) fn ensure_fresh(command: &Command) -> Result<(), AccessError> {
    if command.has_run() {
        return Err(AccessError::CommandReused {
            program: command.program().to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests;
