//! Transport-level error taxonomy shared by every access variant.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::instance::AccessType;

/// Errors surfaced by [`crate::access::Access`] implementations.
///
/// A command that runs and exits non-zero is not an error; its status is
/// carried in the returned [`crate::access::Command`]. These variants cover
/// the cases where the transport itself could not do its job.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AccessError {
    /// Raised when a local process (the target program or a transport
    /// client such as `ssh`) cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the construction-time connectivity probe fails.
    #[error("cannot connect to {target} over {transport}: {message}")]
    Connection {
        /// Transport that was probed.
        transport: AccessType,
        /// `user@host` or path that was probed.
        target: String,
        /// Diagnostic text captured from the probe.
        message: String,
    },
    /// Raised when an upload or download fails.
    #[error("transfer of {source_path} to {destination} failed: {message}")]
    Transfer {
        /// Source of the transfer.
        source_path: String,
        /// Destination of the transfer.
        destination: String,
        /// Diagnostic text.
        message: String,
    },
    /// Raised when an operation needs a capability the transport lacks.
    #[error("{operation} requires a shell prompt, which {transport} access does not provide")]
    CapabilityMismatch {
        /// Operation that was attempted.
        operation: String,
        /// Transport of the access object.
        transport: AccessType,
    },
    /// Raised when a [`crate::access::Command`] is submitted a second time.
    #[error("command {program} has already been executed")]
    CommandReused {
        /// Program of the reused command.
        program: String,
    },
    /// Raised when an internal helper command (listing, probing, cleanup)
    /// exits with an unexpected status.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when a helper script fails or its output cannot be decoded.
    #[error("helper script {script} failed: {message}")]
    Script {
        /// Script that was executed.
        script: String,
        /// Diagnostic text.
        message: String,
    },
    /// Raised when a path cannot be expressed on the transport.
    #[error("unsupported path {path}: {reason}")]
    InvalidPath {
        /// Offending path.
        path: Utf8PathBuf,
        /// Why the path was rejected.
        reason: String,
    },
    /// Raised when local filesystem access fails.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}
