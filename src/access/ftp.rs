//! Access to an instance through the system `ftp` client.
//!
//! FTP moves files but cannot execute anything. Helper scripts are uploaded
//! into the webroot under a random dot-name and triggered through the
//! [`SideChannel`]; [`Access::run_command`] wraps the command in such a
//! helper. There is no [`super::ShellPrompt`].

use std::ffi::OsString;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::cleanup::CleanupGuard;
use super::{
    Access, AccessError, Capability, Command, CommandOutput, CommandRunner, FileTransfer,
    SideChannel, ensure_fresh,
};
use crate::config::FleetConfig;
use crate::instance::{AccessType, Instance};

const FTP_CAPABILITIES: &[Capability] = &[Capability::FileTransfer];
const COMMAND_WRAPPER: &str = include_str!("../../assets/command_wrapper.php");
const SPEC_PLACEHOLDER: &str = "__COMMAND_SPEC__";

/// Transfers files over FTP and executes through an HTTP side channel.
#[derive(Clone, Debug)]
pub struct FtpAccess<R: CommandRunner, S: SideChannel> {
    instance: Instance,
    config: FleetConfig,
    runner: R,
    side_channel: S,
}

#[derive(Serialize)]
struct WrappedCommand<'a> {
    program: &'a str,
    args: &'a [String],
    stdin: Option<&'a str>,
}

#[derive(Deserialize)]
struct WrappedResult {
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl<R: CommandRunner, S: SideChannel> FtpAccess<R, S> {
    /// Creates an FTP access without probing the server.
    #[must_use]
    pub const fn new(instance: Instance, config: FleetConfig, runner: R, side_channel: S) -> Self {
        Self {
            instance,
            config,
            runner,
            side_channel,
        }
    }

    /// Creates an FTP access after logging in once and printing the
    /// working directory.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Connection`] when login or the probe fails.
    pub fn connect(
        instance: Instance,
        config: FleetConfig,
        runner: R,
        side_channel: S,
    ) -> Result<Self, AccessError> {
        let access = Self::new(instance, config, runner, side_channel);
        let output = access.session(&[String::from("pwd")])?;
        if let Some(reason) = session_failure(&output) {
            return Err(AccessError::Connection {
                transport: AccessType::Ftp,
                target: access.instance.destination(),
                message: reason,
            });
        }
        Ok(access)
    }

    fn ftp_args(&self) -> Vec<OsString> {
        let mut args = vec![OsString::from("-n"), OsString::from("-i"), OsString::from("-v")];
        if self.config.ftp_passive {
            args.push(OsString::from("-p"));
        }
        args.push(OsString::from(&self.instance.connection.host));
        args.push(OsString::from(self.instance.connection.port.to_string()));
        args
    }

    fn session(&self, commands: &[String]) -> Result<CommandOutput, AccessError> {
        let connection = &self.instance.connection;
        let mut script = format!(
            "user {} {}\nbinary\n",
            connection.user,
            connection.password.as_deref().unwrap_or_default()
        );
        for command in commands {
            script.push_str(command);
            script.push('\n');
        }
        script.push_str("quit\n");
        debug!(host = %connection.host, commands = commands.len(), "running ftp session");
        self.runner
            .run(&self.config.ftp_bin, &self.ftp_args(), Some(&script))
    }

    fn transfer(&self, verb: &str, from: &Utf8Path, to: &Utf8Path) -> Result<(), AccessError> {
        let line = format!("{verb} {} {}", quote(from)?, quote(to)?);
        let output = self.session(&[line])?;
        match session_failure(&output) {
            None => Ok(()),
            Some(message) => Err(AccessError::Transfer {
                source_path: from.to_string(),
                destination: to.to_string(),
                message,
            }),
        }
    }

    fn list(&self, path: &Utf8Path) -> Result<Option<Vec<String>>, AccessError> {
        let output = self.session(&[format!("nlist {} -", quote(path)?)])?;
        if let Some(reason) = session_failure(&output) {
            if reason.starts_with("550") {
                return Ok(None);
            }
            return Err(AccessError::CommandFailure {
                program: self.config.ftp_bin.clone(),
                status_text: output.status_text(),
                stderr: reason,
            });
        }
        Ok(Some(listing_names(&output.stdout)))
    }

    fn delete_remote_file(&self, path: &Utf8Path) {
        let result = quote(path).and_then(|quoted| self.session(&[format!("delete {quoted}")]));
        match result {
            Ok(output) => match session_failure(&output) {
                None => debug!(%path, "removed remote helper"),
                Some(reason) => warn!(%path, reason, "failed to remove remote helper"),
            },
            Err(err) => warn!(%path, error = %err, "failed to remove remote helper"),
        }
    }

    fn copy_mode(&self, local: &Utf8Path, remote: &Utf8Path) {
        let Some(mode) = executable_mode(local) else {
            return;
        };
        let result = quote(remote)
            .and_then(|quoted| self.session(&[format!("chmod {mode:o} {quoted}")]));
        match result {
            Ok(output) => {
                if let Some(reason) = session_failure(&output) {
                    warn!(%remote, reason, "server refused chmod");
                }
            }
            Err(err) => warn!(%remote, error = %err, "server refused chmod"),
        }
    }
}

impl<R: CommandRunner, S: SideChannel> FileTransfer for FtpAccess<R, S> {
    fn upload(&self, local: &Utf8Path, remote: &Utf8Path) -> Result<(), AccessError> {
        let target = self.instance.resolve(remote);
        self.transfer("put", local, &target)?;
        self.copy_mode(local, &target);
        Ok(())
    }

    fn download(&self, remote: &Utf8Path, local: &Utf8Path) -> Result<(), AccessError> {
        self.transfer("get", &self.instance.resolve(remote), local)
    }
}

impl<R: CommandRunner, S: SideChannel> Access for FtpAccess<R, S> {
    fn instance(&self) -> &Instance {
        &self.instance
    }

    fn capabilities(&self) -> &'static [Capability] {
        FTP_CAPABILITIES
    }

    fn run_command(&self, command: Command) -> Result<Command, AccessError> {
        ensure_fresh(&command)?;
        let wrapper = render_wrapper(&command)?;
        let mut file = tempfile::Builder::new()
            .prefix("fleetkeeper-cmd-")
            .suffix(".php")
            .tempfile()
            .map_err(|err| local_io_error("command wrapper", &err))?;
        file.write_all(wrapper.as_bytes())
            .map_err(|err| local_io_error("command wrapper", &err))?;
        let path = Utf8PathBuf::from_path_buf(file.path().to_path_buf()).map_err(|path| {
            AccessError::InvalidPath {
                path: Utf8PathBuf::from(path.to_string_lossy().into_owned()),
                reason: String::from("temporary path is not valid UTF-8"),
            }
        })?;

        let body = self.run_script(&path, &[])?;
        let result: WrappedResult =
            serde_json::from_str(body.trim()).map_err(|err| AccessError::Script {
                script: path.to_string(),
                message: format!("unexpected command wrapper output: {err}"),
            })?;
        debug!(program = command.program(), code = ?result.code, "ftp command finished");
        Ok(command.complete(CommandOutput {
            code: result.code,
            stdout: result.stdout,
            stderr: result.stderr,
        }))
    }

    fn run_script(&self, script: &Utf8Path, args: &[&str]) -> Result<String, AccessError> {
        let extension = script.extension().unwrap_or("php");
        let name = format!(".fleetkeeper-{}.{extension}", Uuid::new_v4());
        let remote = self.instance.webroot.join(&name);
        let _cleanup = CleanupGuard::new(|| self.delete_remote_file(&remote));

        self.transfer("put", script, &remote)?;
        let url = format!("{}/{name}", self.instance.web_url);
        self.side_channel.fetch(&url, args)
    }

    fn is_empty_dir(&self, path: &Utf8Path) -> Result<bool, AccessError> {
        let names = self.list(&self.instance.resolve(path))?;
        Ok(names.is_none_or(|entries| {
            entries
                .iter()
                .all(|name| name == "." || name == "..")
        }))
    }

    fn file_exists(&self, path: &Utf8Path) -> Result<bool, AccessError> {
        let resolved = self.instance.resolve(path);
        let Some(name) = resolved.file_name() else {
            return Ok(true);
        };
        let parent = resolved.parent().unwrap_or_else(|| Utf8Path::new("/"));
        let names = self.list(parent)?;
        Ok(names.is_some_and(|entries| entries.iter().any(|entry| entry == name)))
    }
}

/// Wraps `path` in double quotes for the `ftp` command language.
fn quote(path: &Utf8Path) -> Result<String, AccessError> {
    if path.as_str().contains(['"', '\n', '\r']) {
        return Err(AccessError::InvalidPath {
            path: path.to_path_buf(),
            reason: String::from("FTP paths cannot contain quotes or line breaks"),
        });
    }
    Ok(format!("\"{path}\""))
}

/// Returns the first reason a session failed, or `None` when it succeeded.
///
/// The client exits zero even when individual commands fail, so server
/// replies in the 4xx and 5xx range are checked in its verbose output.
fn session_failure(output: &CommandOutput) -> Option<String> {
    let combined = output.stdout.lines().chain(output.stderr.lines());
    for line in combined {
        let trimmed = line.trim();
        if is_error_reply(trimmed)
            || trimmed.contains("Not connected")
            || trimmed.contains("Login failed")
            || trimmed.starts_with("ftp:")
        {
            return Some(trimmed.to_owned());
        }
    }
    if output.is_success() {
        None
    } else {
        Some(format!(
            "ftp exited with status {}: {}",
            output.status_text(),
            output.stderr.trim()
        ))
    }
}

fn reply_code(line: &str) -> Option<&str> {
    let code = line.get(..3)?;
    let separator = line.get(3..4)?;
    (code.bytes().all(|byte| byte.is_ascii_digit()) && (separator == " " || separator == "-"))
        .then_some(code)
}

fn is_error_reply(line: &str) -> bool {
    reply_code(line).is_some_and(|code| code.starts_with('4') || code.starts_with('5'))
}

/// Extracts entry names from `nlist` output, dropping server replies and
/// client chatter.
fn listing_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| reply_code(line).is_none())
        .filter(|line| !line.starts_with("local:") && !line.starts_with("Remote system"))
        .filter(|line| !line.starts_with("Using binary mode"))
        .map(|line| line.rsplit('/').next().unwrap_or(line).to_owned())
        .collect()
}

fn render_wrapper(command: &Command) -> Result<String, AccessError> {
    let spec = serde_json::to_string(&WrappedCommand {
        program: command.program(),
        args: command.arguments(),
        stdin: command.stdin(),
    })
    .map_err(|err| AccessError::Script {
        script: String::from("command wrapper"),
        message: err.to_string(),
    })?;
    let literal = spec.replace('\\', "\\\\").replace('\'', "\\'");
    Ok(COMMAND_WRAPPER.replace(SPEC_PLACEHOLDER, &literal))
}

#[cfg(unix)]
fn executable_mode(local: &Utf8Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(local).ok()?.permissions().mode() & 0o777;
    (mode & 0o111 != 0).then_some(mode)
}

#[cfg(not(unix))]
const fn executable_mode(_local: &Utf8Path) -> Option<u32> {
    None
}

fn local_io_error(what: &str, err: &std::io::Error) -> AccessError {
    AccessError::Io {
        path: Utf8PathBuf::from(what),
        message: err.to_string(),
    }
}
