//! Access to an instance on the machine running the tool.

use std::io;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use tracing::debug;

use super::runner::os_args;
use super::{
    Access, AccessError, Capability, Command, CommandRunner, FileTransfer, ShellPrompt,
    ensure_fresh,
};
use crate::instance::{AccessType, Instance};

const LOCAL_CAPABILITIES: &[Capability] = &[Capability::ShellPrompt, Capability::FileTransfer];

/// Runs commands as child processes and transfers files by copying.
#[derive(Clone, Debug)]
pub struct LocalAccess<R: CommandRunner> {
    instance: Instance,
    runner: R,
}

impl<R: CommandRunner> LocalAccess<R> {
    /// Creates a local access without probing the filesystem.
    #[must_use]
    pub const fn new(instance: Instance, runner: R) -> Self {
        Self { instance, runner }
    }

    /// Creates a local access after checking that the webroot's parent
    /// directory exists.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Connection`] when the parent is missing.
    pub fn connect(instance: Instance, runner: R) -> Result<Self, AccessError> {
        let parent = instance
            .webroot
            .parent()
            .unwrap_or_else(|| Utf8Path::new("/"));
        if !parent.is_dir() {
            return Err(AccessError::Connection {
                transport: AccessType::Local,
                target: instance.webroot.to_string(),
                message: format!("parent directory {parent} does not exist"),
            });
        }
        Ok(Self::new(instance, runner))
    }
}

impl<R: CommandRunner> FileTransfer for LocalAccess<R> {
    fn upload(&self, local: &Utf8Path, remote: &Utf8Path) -> Result<(), AccessError> {
        copy_file(local, &self.instance.resolve(remote))
    }

    fn download(&self, remote: &Utf8Path, local: &Utf8Path) -> Result<(), AccessError> {
        copy_file(&self.instance.resolve(remote), local)
    }
}

impl<R: CommandRunner> Access for LocalAccess<R> {
    fn instance(&self) -> &Instance {
        &self.instance
    }

    fn capabilities(&self) -> &'static [Capability] {
        LOCAL_CAPABILITIES
    }

    fn run_command(&self, command: Command) -> Result<Command, AccessError> {
        ensure_fresh(&command)?;
        let output = self.runner.run(
            command.program(),
            &os_args(command.arguments()),
            command.stdin(),
        )?;
        debug!(
            program = command.program(),
            status = %output.status_text(),
            "local command finished"
        );
        Ok(command.complete(output))
    }

    fn run_script(&self, script: &Utf8Path, args: &[&str]) -> Result<String, AccessError> {
        let mut argv = vec![script.as_str()];
        argv.extend_from_slice(args);
        let command = self.run_command(self.create_command(&self.instance.interpreter, &argv))?;
        script_output(script, &command)
    }

    fn is_empty_dir(&self, path: &Utf8Path) -> Result<bool, AccessError> {
        let resolved = self.instance.resolve(path);
        let dir = match Dir::open_ambient_dir(&resolved, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(err) => return Err(io_error(&resolved, &err)),
        };
        let entries = dir.entries().map_err(|err| io_error(&resolved, &err))?;
        for entry in entries {
            let entry = entry.map_err(|err| io_error(&resolved, &err))?;
            let name = entry.file_name().map_err(|err| io_error(&resolved, &err))?;
            if name != "." && name != ".." {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn file_exists(&self, path: &Utf8Path) -> Result<bool, AccessError> {
        let resolved = self.instance.resolve(path);
        let (parent, name) = split_parent(&resolved)?;
        match Dir::open_ambient_dir(parent, ambient_authority()) {
            Ok(dir) => dir
                .try_exists(name)
                .map_err(|err| io_error(&resolved, &err)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_error(parent, &err)),
        }
    }

    fn as_shell(&self) -> Option<&dyn ShellPrompt> {
        Some(self)
    }
}

impl<R: CommandRunner> ShellPrompt for LocalAccess<R> {
    fn shell_exec(&self, command_line: &str, capture_stderr: bool) -> Result<String, AccessError> {
        let line = if capture_stderr {
            format!("{command_line} 2>&1")
        } else {
            command_line.to_owned()
        };
        let command = self.run_command(self.create_command("sh", &["-c", &line]))?;
        Ok(command.stdout().to_owned())
    }
}

/// Maps a finished helper-script command to its stdout.
pub(super) fn script_output(script: &Utf8Path, command: &Command) -> Result<String, AccessError> {
    if command.is_success() {
        return Ok(command.stdout().to_owned());
    }
    Err(AccessError::Script {
        script: script.to_string(),
        message: format!(
            "exited with status {}: {}",
            command.status_text(),
            command.stderr().trim()
        ),
    })
}

fn copy_file(source: &Utf8Path, destination: &Utf8Path) -> Result<(), AccessError> {
    let transfer_error = |err: io::Error| AccessError::Transfer {
        source_path: source.to_string(),
        destination: destination.to_string(),
        message: err.to_string(),
    };
    let (source_parent, source_name) = split_parent(source)?;
    let (destination_parent, destination_name) = split_parent(destination)?;

    let source_dir =
        Dir::open_ambient_dir(source_parent, ambient_authority()).map_err(transfer_error)?;
    Dir::create_ambient_dir_all(destination_parent, ambient_authority())
        .map_err(transfer_error)?;
    let destination_dir =
        Dir::open_ambient_dir(destination_parent, ambient_authority()).map_err(transfer_error)?;

    source_dir
        .copy(source_name, &destination_dir, destination_name)
        .map_err(transfer_error)?;
    let permissions = source_dir
        .metadata(source_name)
        .map_err(transfer_error)?
        .permissions();
    destination_dir
        .set_permissions(destination_name, permissions)
        .map_err(transfer_error)?;
    debug!(%source, %destination, "copied file");
    Ok(())
}

fn split_parent(path: &Utf8Path) -> Result<(&Utf8Path, &str), AccessError> {
    let name = path.file_name().ok_or_else(|| AccessError::InvalidPath {
        path: path.to_path_buf(),
        reason: String::from("path is missing a file name"),
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    Ok((parent, name))
}

fn io_error(path: &Utf8Path, err: &io::Error) -> AccessError {
    AccessError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
