//! Access to an instance through the system `ssh` and `scp` clients.
//!
//! Each [`Command`] is rendered into a single remote shell line with every
//! argument escaped exactly once, then handed to `ssh` as one argument so
//! the local side never interprets it.

use std::ffi::OsString;

use camino::Utf8Path;
use shell_escape::unix::escape;
use tracing::{debug, warn};
use uuid::Uuid;

use super::cleanup::CleanupGuard;
use super::local::script_output;
use super::{
    Access, AccessError, Capability, Command, CommandRunner, FileTransfer, ShellPrompt,
    ensure_fresh,
};
use crate::config::FleetConfig;
use crate::instance::{AccessType, Instance};

const SSH_CAPABILITIES: &[Capability] = &[Capability::ShellPrompt, Capability::FileTransfer];

/// Lists `$1` when it is a directory; a missing path lists nothing.
const EMPTY_DIR_PROBE: &str = r#"[ -e "$1" ] || exit 0; [ -d "$1" ] || exit 20; exec ls -A1 -- "$1""#;
const NOT_A_DIRECTORY: i32 = 20;

/// Runs commands over SSH and transfers files with `scp`.
#[derive(Clone, Debug)]
pub struct SshAccess<R: CommandRunner> {
    instance: Instance,
    config: FleetConfig,
    runner: R,
}

impl<R: CommandRunner> SshAccess<R> {
    /// Creates an SSH access without probing the connection.
    #[must_use]
    pub const fn new(instance: Instance, config: FleetConfig, runner: R) -> Self {
        Self {
            instance,
            config,
            runner,
        }
    }

    /// Creates an SSH access and verifies the host accepts a session.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Connection`] when the probe exits non-zero.
    pub fn connect(
        instance: Instance,
        config: FleetConfig,
        runner: R,
    ) -> Result<Self, AccessError> {
        let access = Self::new(instance, config, runner);
        let output = access
            .runner
            .run(&access.config.ssh_bin, &access.ssh_args("true"), None)?;
        if !output.is_success() {
            return Err(AccessError::Connection {
                transport: AccessType::Ssh,
                target: access.instance.destination(),
                message: format!(
                    "probe exited with status {}: {}",
                    output.status_text(),
                    output.stderr.trim()
                ),
            });
        }
        Ok(access)
    }

    fn common_ssh_options(&self, port_flag: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from(port_flag),
            OsString::from(self.instance.connection.port.to_string()),
        ];

        if let Some(ref identity_file) = self.instance.connection.identity_file {
            args.push(OsString::from("-i"));
            args.push(OsString::from(expand_tilde(identity_file)));
        }

        if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        args.push(OsString::from("-o"));
        args.push(OsString::from(format!(
            "ConnectTimeout={}",
            self.config.ssh_connect_timeout_secs
        )));

        args
    }

    fn ssh_args(&self, remote_line: &str) -> Vec<OsString> {
        let mut args = self.common_ssh_options("-p");
        args.push(OsString::from(self.instance.destination()));
        args.push(OsString::from(remote_line));
        args
    }

    fn remote_spec(&self, path: &Utf8Path) -> String {
        let resolved = self.instance.resolve(path);
        format!(
            "{}:{}",
            self.instance.destination(),
            escape(resolved.as_str().into())
        )
    }

    fn scp(&self, from: &str, to: &str) -> Result<(), AccessError> {
        let mut args = self.common_ssh_options("-P");
        args.push(OsString::from("-p"));
        args.push(OsString::from(from));
        args.push(OsString::from(to));
        let output = self.runner.run(&self.config.scp_bin, &args, None)?;
        if output.is_success() {
            debug!(from, to, "scp transfer finished");
            return Ok(());
        }
        Err(AccessError::Transfer {
            source_path: from.to_owned(),
            destination: to.to_owned(),
            message: format!(
                "{} exited with status {}: {}",
                self.config.scp_bin,
                output.status_text(),
                output.stderr.trim()
            ),
        })
    }

    fn remove_remote_file(&self, path: &Utf8Path) {
        let command = self.create_command("rm", &["-f", path.as_str()]);
        match self.run_command(command) {
            Ok(done) if done.is_success() => debug!(%path, "removed remote temp file"),
            Ok(done) => warn!(
                %path,
                status = %done.status_text(),
                stderr = done.stderr().trim(),
                "failed to remove remote temp file"
            ),
            Err(err) => warn!(%path, error = %err, "failed to remove remote temp file"),
        }
    }

    fn helper_failure(command: &Command) -> AccessError {
        AccessError::CommandFailure {
            program: command.program().to_owned(),
            status_text: command.status_text(),
            stderr: command.stderr().trim().to_owned(),
        }
    }
}

impl<R: CommandRunner> FileTransfer for SshAccess<R> {
    fn upload(&self, local: &Utf8Path, remote: &Utf8Path) -> Result<(), AccessError> {
        self.scp(local.as_str(), &self.remote_spec(remote))
    }

    fn download(&self, remote: &Utf8Path, local: &Utf8Path) -> Result<(), AccessError> {
        self.scp(&self.remote_spec(remote), local.as_str())
    }
}

impl<R: CommandRunner> Access for SshAccess<R> {
    fn instance(&self) -> &Instance {
        &self.instance
    }

    fn capabilities(&self) -> &'static [Capability] {
        SSH_CAPABILITIES
    }

    fn run_command(&self, command: Command) -> Result<Command, AccessError> {
        ensure_fresh(&command)?;
        let args = self.ssh_args(&command.shell_line());
        let output = self
            .runner
            .run(&self.config.ssh_bin, &args, command.stdin())?;
        debug!(program = command.program(), status = %output.status_text(), "ssh command finished");
        Ok(command.complete(output))
    }

    fn run_script(&self, script: &Utf8Path, args: &[&str]) -> Result<String, AccessError> {
        let extension = script.extension().unwrap_or("php");
        let remote = self
            .instance
            .temp_dir
            .join(format!("fleetkeeper-{}.{extension}", Uuid::new_v4()));
        let _cleanup = CleanupGuard::new(|| self.remove_remote_file(&remote));

        self.upload(script, &remote)?;
        let mut argv = vec![remote.as_str()];
        argv.extend_from_slice(args);
        let command = self.run_command(self.create_command(&self.instance.interpreter, &argv))?;
        script_output(script, &command)
    }

    fn is_empty_dir(&self, path: &Utf8Path) -> Result<bool, AccessError> {
        let resolved = self.instance.resolve(path);
        let command = self.run_command(self.create_command(
            "sh",
            &["-c", EMPTY_DIR_PROBE, "sh", resolved.as_str()],
        ))?;
        match command.exit_code() {
            Some(0) => Ok(!command
                .stdout()
                .lines()
                .map(str::trim)
                .any(|name| !name.is_empty() && name != "." && name != "..")),
            Some(NOT_A_DIRECTORY) => Err(AccessError::Io {
                path: resolved,
                message: String::from("not a directory"),
            }),
            _ => Err(Self::helper_failure(&command)),
        }
    }

    fn file_exists(&self, path: &Utf8Path) -> Result<bool, AccessError> {
        let resolved = self.instance.resolve(path);
        let command = self.run_command(self.create_command("test", &["-e", resolved.as_str()]))?;
        match command.exit_code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(Self::helper_failure(&command)),
        }
    }

    fn as_shell(&self) -> Option<&dyn ShellPrompt> {
        Some(self)
    }
}

impl<R: CommandRunner> ShellPrompt for SshAccess<R> {
    fn shell_exec(&self, command_line: &str, capture_stderr: bool) -> Result<String, AccessError> {
        let line = if capture_stderr {
            format!("{command_line} 2>&1")
        } else {
            command_line.to_owned()
        };
        let output = self
            .runner
            .run(&self.config.ssh_bin, &self.ssh_args(&line), None)?;
        Ok(output.stdout)
    }
}

/// Expands a leading `~/` prefix to the user's home directory.
///
/// If `HOME` is not set the input is returned unchanged.
#[must_use]
pub(crate) fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}
