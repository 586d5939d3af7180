//! Archive extraction on the target.
//!
//! Each [`ArchiveFormat`] maps to an argument builder through a fixed
//! table; nothing is looked up by name at run time.

use camino::Utf8Path;
use thiserror::Error;
use tracing::info;

use crate::access::{Access, AccessError, Command};

/// Archive formats the tool can unpack.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ArchiveFormat {
    /// Uncompressed tarball.
    Tar,
    /// Gzip-compressed tarball.
    TarGz,
    /// Bzip2-compressed tarball.
    TarBz2,
    /// Xz-compressed tarball.
    TarXz,
    /// Zip archive.
    Zip,
}

type ArgvBuilder = fn(&str, &str) -> (&'static str, Vec<String>);

const SUFFIXES: &[(&str, ArchiveFormat)] = &[
    (".tar.gz", ArchiveFormat::TarGz),
    (".tgz", ArchiveFormat::TarGz),
    (".tar.bz2", ArchiveFormat::TarBz2),
    (".tbz2", ArchiveFormat::TarBz2),
    (".tar.xz", ArchiveFormat::TarXz),
    (".txz", ArchiveFormat::TarXz),
    (".tar", ArchiveFormat::Tar),
    (".zip", ArchiveFormat::Zip),
];

const HANDLERS: &[(ArchiveFormat, ArgvBuilder)] = &[
    (ArchiveFormat::Tar, untar),
    (ArchiveFormat::TarGz, untar_gzip),
    (ArchiveFormat::TarBz2, untar_bzip2),
    (ArchiveFormat::TarXz, untar_xz),
    (ArchiveFormat::Zip, unzip),
];

fn untar(archive: &str, dest: &str) -> (&'static str, Vec<String>) {
    tar_argv("-xf", archive, dest)
}

fn untar_gzip(archive: &str, dest: &str) -> (&'static str, Vec<String>) {
    tar_argv("-xzf", archive, dest)
}

fn untar_bzip2(archive: &str, dest: &str) -> (&'static str, Vec<String>) {
    tar_argv("-xjf", archive, dest)
}

fn untar_xz(archive: &str, dest: &str) -> (&'static str, Vec<String>) {
    tar_argv("-xJf", archive, dest)
}

fn unzip(archive: &str, dest: &str) -> (&'static str, Vec<String>) {
    (
        "unzip",
        vec![
            String::from("-o"),
            String::from("-q"),
            archive.to_owned(),
            String::from("-d"),
            dest.to_owned(),
        ],
    )
}

fn tar_argv(flags: &str, archive: &str, dest: &str) -> (&'static str, Vec<String>) {
    (
        "tar",
        vec![
            flags.to_owned(),
            archive.to_owned(),
            String::from("-C"),
            dest.to_owned(),
        ],
    )
}

impl ArchiveFormat {
    /// Detects the format from the file name suffix, case-insensitively.
    #[must_use]
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        let name = path.file_name()?.to_ascii_lowercase();
        SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|&(_, format)| format)
    }

    /// Program and arguments that unpack `archive` into `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NoHandler`] if the table lacks this format.
    pub fn extraction_command(
        self,
        archive: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<(&'static str, Vec<String>), ArchiveError> {
        let (_, build) = HANDLERS
            .iter()
            .find(|(format, _)| *format == self)
            .ok_or(ArchiveError::NoHandler(self))?;
        Ok(build(archive.as_str(), destination.as_str()))
    }
}

/// Unpacks an archive already on the target into `destination`, creating
/// the directory first.
///
/// # Errors
///
/// Returns [`ArchiveError::UnknownFormat`] for unrecognised file names,
/// [`ArchiveError::Access`] when the transport has no shell, or
/// [`ArchiveError::CommandFailure`] when a step exits non-zero.
pub fn extract(
    access: &dyn Access,
    archive: &Utf8Path,
    destination: &Utf8Path,
) -> Result<(), ArchiveError> {
    let format = ArchiveFormat::from_path(archive)
        .ok_or_else(|| ArchiveError::UnknownFormat(archive.to_string()))?;
    let shell = access.require_shell("extract archive")?;
    let instance = access.instance();
    let archive_path = instance.resolve(archive);
    let destination_path = instance.resolve(destination);

    let mkdir =
        shell.run_command(shell.create_command("mkdir", &["-p", destination_path.as_str()]))?;
    check("mkdir", &mkdir)?;

    let (program, args) = format.extraction_command(&archive_path, &destination_path)?;
    let refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let unpack = shell.run_command(shell.create_command(program, &refs))?;
    check(program, &unpack)?;
    info!(archive = %archive_path, destination = %destination_path, ?format, "extracted archive");
    Ok(())
}

fn check(program: &str, command: &Command) -> Result<(), ArchiveError> {
    if command.is_success() {
        return Ok(());
    }
    Err(ArchiveError::CommandFailure {
        program: program.to_owned(),
        status_text: command.status_text(),
        stderr: command.stderr().trim().to_owned(),
    })
}

/// Errors raised while extracting archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Raised when the transport fails or lacks a shell.
    #[error(transparent)]
    Access(#[from] AccessError),
    /// Raised when the file name has no recognised suffix.
    #[error("unrecognised archive format: {0}")]
    UnknownFormat(String),
    /// Raised when a format has no registered extractor.
    #[error("no extractor registered for {0:?}")]
    NoHandler(ArchiveFormat),
    /// Raised when an extraction step exits non-zero.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Human readable exit status.
        status_text: String,
        /// Stderr captured from the program.
        stderr: String,
    },
}
