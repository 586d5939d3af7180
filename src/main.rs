//! Binary entry point for the fleetkeeper CLI.

use std::fs;
use std::io::{self, BufRead, Write};
use std::process;

use camino::Utf8Path;
use clap::Parser;
use thiserror::Error;
use tracing::info;

use fleetkeeper::access::{AccessError, open_access};
use fleetkeeper::checksum::{
    ChecksumError, IgnorePattern, checksum_folder, diff, parse_wire, render_wire, to_map,
};
use fleetkeeper::config::{ConfigError, FleetConfig};
use fleetkeeper::instance::{AccessType, Instance, InstanceError};
use fleetkeeper::logging;
use fleetkeeper::vcs::{
    AbortOnConflict, ConflictDecision, ConflictReport, ConflictResolver, DiscardOnConflict,
    VcsError, VcsState, open_version_control, update_instance_to,
};

mod cli;

use cli::{
    ChecksumCommand, Cli, Command, DiffCommand, ExecCommand, TargetArgs, TransportArg,
    UpdateCommand,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("instance error: {0}")]
    Instance(#[from] InstanceError),
    #[error("access error: {0}")]
    Access(#[from] AccessError),
    #[error("checksum error: {0}")]
    Checksum(#[from] ChecksumError),
    #[error("version control error: {0}")]
    Vcs(#[from] VcsError),
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to write output: {0}")]
    Output(String),
    #[error("command terminated without an exit status")]
    MissingExitCode,
    #[error("invalid command argument: {0}")]
    InvalidCommand(String),
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let exit_code = match dispatch(cli.command) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn dispatch(command: Command) -> Result<i32, CliError> {
    match command {
        Command::Checksum(args) => checksum_command(&args, &mut io::stdout().lock()),
        Command::Diff(args) => diff_command(&args, &mut io::stdout().lock()),
        Command::Exec(args) => exec_command(&args),
        Command::Update(args) => update_command(&args),
    }
}

fn load_config() -> Result<FleetConfig, CliError> {
    let config = FleetConfig::load_without_cli_args()?;
    config.validate()?;
    Ok(config)
}

fn checksum_command(args: &ChecksumCommand, out: &mut impl Write) -> Result<i32, CliError> {
    let pattern = match args.ignore {
        Some(ref pattern) => pattern.clone(),
        None => load_config()?.checksum_ignore_pattern,
    };
    let ignore = IgnorePattern::new(&pattern)?;
    let entries: Vec<_> = checksum_folder(Utf8Path::new(&args.folder), &ignore)?.collect();
    out.write_all(render_wire(&entries).as_bytes())
        .map_err(|err| CliError::Output(err.to_string()))?;
    info!(folder = %args.folder, files = entries.len(), "checksummed folder");
    Ok(0)
}

fn read_listing(path: &str) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|err| CliError::Read {
        path: path.to_owned(),
        message: err.to_string(),
    })
}

fn diff_command(args: &DiffCommand, out: &mut impl Write) -> Result<i32, CliError> {
    let baseline = to_map(parse_wire(&read_listing(&args.baseline)?));
    let snapshot = to_map(parse_wire(&read_listing(&args.snapshot)?));
    let result = diff(&baseline, &snapshot);
    for line in result.change_lines() {
        writeln!(out, "{line}").map_err(|err| CliError::Output(err.to_string()))?;
    }
    let summary = result.summary();
    info!(
        new = summary.new,
        modified = summary.modified,
        deleted = summary.deleted,
        pristine = summary.pristine,
        "compared listings"
    );
    Ok(i32::from(!result.is_clean()))
}

fn build_instance(target: &TargetArgs) -> Result<Instance, CliError> {
    let access_type = match target.access {
        TransportArg::Local => AccessType::Local,
        TransportArg::Ssh => AccessType::Ssh,
    };
    let mut builder = Instance::builder()
        .id(target.host.as_deref().unwrap_or("local"))
        .webroot(target.webroot.as_str())
        .access_type(access_type)
        .identity_file(target.identity_file.clone());
    if let Some(ref host) = target.host {
        builder = builder.host(host.as_str());
    }
    if let Some(ref user) = target.user {
        builder = builder.user(user.as_str());
    }
    if let Some(port) = target.port {
        builder = builder.port(port);
    }
    Ok(builder.build()?)
}

fn exec_command(args: &ExecCommand) -> Result<i32, CliError> {
    validate_command_args(&args.command)?;
    let Some((program, rest)) = args.command.split_first() else {
        return Err(CliError::InvalidCommand(String::from("no command given")));
    };
    let instance = build_instance(&args.target)?;
    let config = load_config()?;
    let access = open_access(&instance, &config)?;

    let argv: Vec<&str> = rest.iter().map(String::as_str).collect();
    let done = access.run_command(access.create_command(program, &argv))?;
    io::stdout().write_all(done.stdout().as_bytes()).ok();
    io::stderr().write_all(done.stderr().as_bytes()).ok();
    done.exit_code().ok_or(CliError::MissingExitCode)
}

fn update_command(args: &UpdateCommand) -> Result<i32, CliError> {
    let instance = build_instance(&args.target)?;
    let config = load_config()?;
    let access = open_access(&instance, &config)?;
    let path = args
        .path
        .as_deref()
        .map_or_else(
            || instance.webroot.clone(),
            |relative| instance.resolve(Utf8Path::new(relative)),
        );

    let vcs = open_version_control(access.as_ref(), &config, &path, &args.repository_root)?;
    let resolver: &dyn ConflictResolver = if args.discard_local_changes {
        &DiscardOnConflict
    } else if args.abort_on_conflict {
        &AbortOnConflict
    } else {
        &PromptResolver
    };
    let outcome = update_instance_to(vcs.as_ref(), resolver, &path, &args.reference)?;

    let mut stdout = io::stdout();
    writeln!(
        stdout,
        "{path}: {} ({} -> {})",
        describe_action(outcome.action),
        outcome.previous.branch,
        args.reference
    )
    .ok();
    if outcome.discarded_local_changes {
        writeln!(stdout, "{path}: local changes were discarded").ok();
    }
    Ok(0)
}

const fn describe_action(action: VcsState) -> &'static str {
    match action {
        VcsState::Clean => "already up to date",
        VcsState::NeedsUpdate => "updated",
        VcsState::NeedsUpgrade => "switched",
        VcsState::Conflicted => "conflicted",
    }
}

/// Asks the operator on the terminal how to handle a conflicted preview.
struct PromptResolver;

impl ConflictResolver for PromptResolver {
    fn resolve(&self, report: &ConflictReport) -> ConflictDecision {
        let mut stderr = io::stderr();
        writeln!(stderr, "{}", report.output.trim_end()).ok();
        write!(
            stderr,
            "{} reports conflicts in {}. Discard local changes? [y/N] ",
            report.kind, report.path
        )
        .ok();
        stderr.flush().ok();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return ConflictDecision::Abort;
        }
        parse_answer(&answer)
    }
}

fn parse_answer(answer: &str) -> ConflictDecision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ConflictDecision::DiscardLocalChanges,
        _ => ConflictDecision::Abort,
    }
}

fn validate_command_args(args: &[String]) -> Result<(), CliError> {
    for arg in args {
        if arg
            .chars()
            .any(|ch| matches!(ch, '\n' | '\r' | '\u{0000}'..='\u{001F}' | '\u{007F}'))
        {
            return Err(CliError::InvalidCommand(String::from(concat!(
                "command arguments must not contain control characters (ASCII ",
                "0x00-0x1F or 0x7F, e.g. newline, carriage return, tab, NUL)"
            ))));
        }
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp dir is not utf-8: {}", path.display()))
    }

    #[test]
    fn validate_command_args_rejects_control_characters() {
        let err = validate_command_args(&[String::from("echo\tbad")])
            .expect_err("tab should be rejected");

        assert!(
            matches!(err, CliError::InvalidCommand(ref message) if message.contains("control characters")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn validate_command_args_accepts_safe_arguments() {
        assert!(validate_command_args(&[String::from("echo"), String::from("ok")]).is_ok());
    }

    #[rstest]
    #[case("y\n", ConflictDecision::DiscardLocalChanges)]
    #[case(" YES ", ConflictDecision::DiscardLocalChanges)]
    #[case("\n", ConflictDecision::Abort)]
    #[case("no", ConflictDecision::Abort)]
    fn parse_answer_defaults_to_abort(#[case] answer: &str, #[case] expected: ConflictDecision) {
        assert_eq!(parse_answer(answer), expected);
    }

    #[test]
    fn build_instance_maps_ssh_target() {
        let target = TargetArgs {
            access: TransportArg::Ssh,
            webroot: String::from("/var/www/blog"),
            host: Some(String::from("web1")),
            port: Some(2222),
            user: Some(String::from("deploy")),
            identity_file: None,
        };

        let instance = build_instance(&target).expect("instance should build");

        assert_eq!(instance.access_type, AccessType::Ssh);
        assert_eq!(instance.destination(), "deploy@web1");
        assert_eq!(instance.connection.port, 2222);
        assert_eq!(instance.webroot, Utf8PathBuf::from("/var/www/blog"));
    }

    #[test]
    fn checksum_command_prints_wire_lines() {
        let dir = TempDir::new().expect("temp dir");
        let root = utf8(&dir);
        fs::write(root.join("hello.txt"), "hello").expect("write file");
        fs::create_dir(root.join("temp")).expect("create temp");
        fs::write(root.join("temp/cache.txt"), "cache").expect("write cache");

        let mut out = Vec::new();
        let code = checksum_command(
            &ChecksumCommand {
                folder: root.to_string(),
                ignore: Some(String::from("(^|/)temp(/|$)")),
            },
            &mut out,
        )
        .expect("checksum should succeed");

        assert_eq!(code, 0);
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "5d41402abc4b2a76b9719d911017c592:hello.txt\n"
        );
    }

    #[test]
    fn diff_command_exits_one_on_drift() {
        let dir = TempDir::new().expect("temp dir");
        let root = utf8(&dir);
        let baseline = root.join("baseline.txt");
        let snapshot = root.join("snapshot.txt");
        fs::write(&baseline, "aa:index.php\nbb:lib/a.php\n").expect("write baseline");
        fs::write(&snapshot, "aa:index.php\ncc:lib/a.php\ndd:shell.php\n").expect("write snapshot");

        let mut out = Vec::new();
        let code = diff_command(
            &DiffCommand {
                baseline: baseline.to_string(),
                snapshot: snapshot.to_string(),
            },
            &mut out,
        )
        .expect("diff should succeed");

        assert_eq!(code, 1);
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "M lib/a.php\nA shell.php\n"
        );
    }

    #[test]
    fn diff_command_reports_missing_listing() {
        let err = diff_command(
            &DiffCommand {
                baseline: String::from("/nonexistent/baseline.txt"),
                snapshot: String::from("/nonexistent/snapshot.txt"),
            },
            &mut Vec::new(),
        )
        .expect_err("missing file should fail");

        assert!(matches!(err, CliError::Read { ref path, .. } if path == "/nonexistent/baseline.txt"));
    }

    #[test]
    fn write_error_writes_cli_error() {
        let mut buf = Vec::new();
        write_error(&mut buf, &CliError::MissingExitCode);
        let rendered = String::from_utf8(buf).expect("utf8");
        assert!(
            rendered.contains("command terminated without an exit status"),
            "rendered: {rendered}"
        );
    }
}
