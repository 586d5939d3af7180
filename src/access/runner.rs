//! Process runner abstraction.
//!
//! Every transport funnels process execution through [`CommandRunner`] so
//! tests can script outcomes without spawning processes.

use std::ffi::OsString;
use std::io::Write;
use std::process::{Command, Stdio};

use tracing::debug;

use super::command::CommandOutput;
use super::error::AccessError;

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, feeding `stdin` when
    /// provided and capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Spawn`] if the command cannot be started.
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, AccessError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, AccessError> {
        debug!(program, argc = args.len(), "spawning process");
        let spawn_error = |err: std::io::Error| AccessError::Spawn {
            program: program.to_owned(),
            message: err.to_string(),
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        let pipe = child.stdin.take();
        let output = std::thread::scope(|scope| {
            if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
                // The child may exit without draining stdin; a broken pipe
                // is reflected in its exit status instead.
                scope.spawn(move || pipe.write_all(input.as_bytes()).ok());
            }
            child.wait_with_output()
        })
        .map_err(spawn_error)?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Converts string arguments into the runner's argument representation.
pub(crate) fn os_args<S: AsRef<str>>(args: &[S]) -> Vec<OsString> {
    args.iter().map(|arg| OsString::from(arg.as_ref())).collect()
}
