//! Command-line interface definitions for the `fleetkeeper` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI for the `fleetkeeper` binary.
#[derive(Debug, Parser)]
#[command(
    name = "fleetkeeper",
    about = "Audit and update remote web-application installations",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub(crate) verbose: u8,
    /// Subcommand to run.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands of the `fleetkeeper` binary.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Print `hash:path` lines for every tracked file under a folder.
    #[command(name = "checksum")]
    Checksum(ChecksumCommand),
    /// Compare two checksum listings and print added, modified, and deleted paths.
    #[command(name = "diff")]
    Diff(DiffCommand),
    /// Run a command on an instance and propagate its exit code.
    #[command(name = "exec")]
    Exec(ExecCommand),
    /// Bring a working copy to a branch or tag, gating on conflicts.
    #[command(name = "update")]
    Update(UpdateCommand),
}

/// Arguments for `fleetkeeper checksum`.
#[derive(Debug, Args)]
pub(crate) struct ChecksumCommand {
    /// Folder to walk.
    #[arg(value_name = "FOLDER")]
    pub(crate) folder: String,
    /// Regular expression of relative paths to skip; defaults to configuration.
    #[arg(long, value_name = "REGEX")]
    pub(crate) ignore: Option<String>,
}

/// Arguments for `fleetkeeper diff`.
#[derive(Debug, Args)]
pub(crate) struct DiffCommand {
    /// Checksum listing of the known-good baseline.
    #[arg(long, value_name = "FILE")]
    pub(crate) baseline: String,
    /// Checksum listing of the live snapshot.
    #[arg(long, value_name = "FILE")]
    pub(crate) snapshot: String,
}

/// Transports selectable from the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum TransportArg {
    /// Run on this machine.
    Local,
    /// Run through the system `ssh` client.
    Ssh,
}

/// Connection arguments shared by instance-facing subcommands.
#[derive(Debug, Args)]
pub(crate) struct TargetArgs {
    /// Transport used to reach the instance.
    #[arg(long, value_enum, default_value_t = TransportArg::Local)]
    pub(crate) access: TransportArg,
    /// Application root on the target.
    #[arg(long, value_name = "PATH")]
    pub(crate) webroot: String,
    /// Remote host for SSH.
    #[arg(long, value_name = "HOST", required_if_eq("access", "ssh"))]
    pub(crate) host: Option<String>,
    /// Remote port for SSH.
    #[arg(long, value_name = "PORT")]
    pub(crate) port: Option<u16>,
    /// Remote account for SSH.
    #[arg(long, value_name = "USER", required_if_eq("access", "ssh"))]
    pub(crate) user: Option<String>,
    /// SSH private key.
    #[arg(long, value_name = "PATH")]
    pub(crate) identity_file: Option<String>,
}

/// Arguments for `fleetkeeper exec`.
#[derive(Debug, Args)]
pub(crate) struct ExecCommand {
    /// Instance to run on.
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Command to execute (use -- to separate flags).
    #[arg(required = true, trailing_var_arg = true)]
    pub(crate) command: Vec<String>,
}

/// Arguments for `fleetkeeper update`.
#[derive(Debug, Args)]
pub(crate) struct UpdateCommand {
    /// Instance holding the working copy.
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Repository root the working copy must belong to.
    #[arg(long, value_name = "URL")]
    pub(crate) repository_root: String,
    /// Branch or tag to end up on.
    #[arg(long = "to", value_name = "REF")]
    pub(crate) reference: String,
    /// Working copy path, relative to the webroot; defaults to the webroot.
    #[arg(long, value_name = "PATH")]
    pub(crate) path: Option<String>,
    /// Revert local changes instead of prompting when conflicts are found.
    #[arg(long, conflicts_with = "abort_on_conflict")]
    pub(crate) discard_local_changes: bool,
    /// Stop without prompting when conflicts are found.
    #[arg(long)]
    pub(crate) abort_on_conflict: bool,
}
