//! Core library for the fleetkeeper installation manager.
//!
//! Every operation on a managed [`Instance`] runs through an
//! [`access::Access`]: a local process, an SSH session, or an FTP session
//! paired with an HTTP side channel. On top of that sit checksum baselines
//! and drift validation ([`checksum`]), the SVN/Git update state machine
//! ([`vcs`]), and thin consumers for MySQL ([`database`]), crontabs
//! ([`crontab`]), and archives ([`archive`]).

pub mod access;
pub mod archive;
pub mod checksum;
pub mod config;
pub mod crontab;
pub mod database;
pub mod instance;
pub mod logging;
pub mod test_support;
pub mod vcs;

pub use access::{
    Access, AccessError, Capability, Command, CommandOutput, CommandRunner, FileTransfer,
    FtpAccess, LocalAccess, ProcessCommandRunner, ShellPrompt, SshAccess, open_access,
};
pub use checksum::{ChecksumEngine, ChecksumError, ChecksumStore, DiffResult, IgnorePattern};
pub use config::{ConfigError, FleetConfig};
pub use instance::{AccessType, Instance, InstanceError};
pub use vcs::{VcsError, VcsState, VersionControl, update_instance_to};
