//! Command value object shared by every transport.

use shell_escape::unix::escape;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Returns the exit code as text, or `unknown` when the process was
    /// terminated without one.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// One external process invocation: program, arguments, and optional stdin.
///
/// A command is built unexecuted by [`crate::access::Access::create_command`]
/// and populated exactly once by [`crate::access::Access::run_command`].
/// After that its output is immutable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Command {
    program: String,
    args: Vec<String>,
    stdin: Option<String>,
    output: Option<CommandOutput>,
}

impl Command {
    /// Creates an unexecuted command for `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            output: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    /// Sets the text written to the process's standard input.
    #[must_use]
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Ordered argument vector.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Standard input, if any.
    #[must_use]
    pub fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// Captured output once the command has run.
    #[must_use]
    pub const fn output(&self) -> Option<&CommandOutput> {
        self.output.as_ref()
    }

    /// Returns `true` once the command has been executed.
    #[must_use]
    pub const fn has_run(&self) -> bool {
        self.output.is_some()
    }

    /// Exit code, or `None` before execution or after signal termination.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.output.as_ref().and_then(|output| output.code)
    }

    /// Captured stdout; empty before execution.
    #[must_use]
    pub fn stdout(&self) -> &str {
        self.output.as_ref().map_or("", |output| output.stdout.as_str())
    }

    /// Captured stderr; empty before execution.
    #[must_use]
    pub fn stderr(&self) -> &str {
        self.output.as_ref().map_or("", |output| output.stderr.as_str())
    }

    /// Returns `true` when the command ran and exited with zero.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.output.as_ref().is_some_and(CommandOutput::is_success)
    }

    /// Exit status as text for diagnostics.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.output
            .as_ref()
            .map_or_else(|| String::from("not run"), CommandOutput::status_text)
    }

    /// Renders the command as a single POSIX shell line, escaping the
    /// program and each argument exactly once.
    #[must_use]
    pub fn shell_line(&self) -> String {
        let mut line = String::from(escape(self.program.as_str().into()));
        for arg in &self.args {
            line.push(' ');
            line.push_str(escape(arg.as_str().into()).as_ref());
        }
        line
    }

    pub(crate) fn complete(mut self, output: CommandOutput) -> Self {
        self.output = Some(output);
        self
    }
}
