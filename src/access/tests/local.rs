//! Local transport tests against a temporary webroot.

use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::access::{Access, AccessError, Capability, FileTransfer, LocalAccess, ProcessCommandRunner};
use crate::instance::Instance;

struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
    access: LocalAccess<ProcessCommandRunner>,
}

#[fixture]
fn workspace() -> Workspace {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(dir.path().join("webroot"))
        .unwrap_or_else(|path| panic!("non UTF-8 tempdir: {}", path.display()));
    fs::create_dir(&root).unwrap_or_else(|err| panic!("create webroot: {err}"));
    let instance = Instance::builder()
        .id("local")
        .webroot(root.as_str())
        .interpreter("sh")
        .build()
        .unwrap_or_else(|err| panic!("instance: {err}"));
    let access = LocalAccess::connect(instance, ProcessCommandRunner)
        .unwrap_or_else(|err| panic!("connect: {err}"));
    Workspace {
        _dir: dir,
        root,
        access,
    }
}

#[rstest]
fn run_command_captures_exit_code_and_streams(workspace: Workspace) {
    let command = workspace.access.create_command("sh", &["-c", "echo out; echo err >&2; exit 3"]);
    let done = workspace
        .access
        .run_command(command)
        .expect("command should run");

    assert_eq!(done.exit_code(), Some(3));
    assert_eq!(done.stdout(), "out\n");
    assert_eq!(done.stderr(), "err\n");
}

#[rstest]
fn echo_hello_succeeds_with_clean_stderr(workspace: Workspace) {
    let command = workspace.access.create_command("echo", &["hello"]);
    let done = workspace.access.run_command(command).expect("echo should run");

    assert_eq!(done.exit_code(), Some(0));
    assert_eq!(done.stdout(), "hello\n");
    assert_eq!(done.stderr(), "");
}

#[rstest]
fn run_command_feeds_stdin(workspace: Workspace) {
    let command = workspace.access.create_command("cat", &[]).with_stdin("piped");
    let done = workspace.access.run_command(command).expect("cat should run");
    assert_eq!(done.stdout(), "piped");
}

#[rstest]
fn run_command_rejects_reused_commands(workspace: Workspace) {
    let done = workspace
        .access
        .run_command(workspace.access.create_command("true", &[]))
        .expect("true should run");
    let err = workspace
        .access
        .run_command(done)
        .expect_err("second run should fail");
    assert!(matches!(err, AccessError::CommandReused { .. }));
}

#[rstest]
fn missing_program_is_a_spawn_error(workspace: Workspace) {
    let command = workspace.access.create_command("fleetkeeper-no-such-binary", &[]);
    let err = workspace
        .access
        .run_command(command)
        .expect_err("spawn should fail");
    assert!(matches!(err, AccessError::Spawn { .. }));
}

#[rstest]
fn upload_and_download_copy_files_and_modes(workspace: Workspace) {
    let source = workspace.root.join("../deploy.sh");
    fs::write(&source, "#!/bin/sh\necho hi\n").expect("write source");
    #[cfg(unix)]
    fs::set_permissions(&source, fs::Permissions::from_mode(0o755)).expect("chmod source");

    workspace
        .access
        .upload(&source, Utf8Path::new("bin/deploy.sh"))
        .expect("upload should succeed");
    let uploaded = workspace.root.join("bin/deploy.sh");
    assert_eq!(fs::read_to_string(&uploaded).expect("read upload"), "#!/bin/sh\necho hi\n");
    #[cfg(unix)]
    assert_eq!(
        fs::metadata(&uploaded).expect("stat upload").permissions().mode() & 0o777,
        0o755
    );

    let copy = workspace.root.join("../copy.sh");
    workspace
        .access
        .download(Utf8Path::new("bin/deploy.sh"), &copy)
        .expect("download should succeed");
    assert_eq!(fs::read_to_string(&copy).expect("read copy"), "#!/bin/sh\necho hi\n");
}

#[rstest]
fn is_empty_dir_treats_missing_directories_as_empty(workspace: Workspace) {
    assert!(workspace.access.is_empty_dir(Utf8Path::new("nowhere")).expect("missing dir"));
    fs::create_dir(workspace.root.join("cache")).expect("mkdir");
    assert!(workspace.access.is_empty_dir(Utf8Path::new("cache")).expect("empty dir"));
    fs::write(workspace.root.join("cache/.keep"), "").expect("touch");
    assert!(!workspace.access.is_empty_dir(Utf8Path::new("cache")).expect("populated dir"));
}

#[rstest]
fn is_empty_dir_rejects_regular_files(workspace: Workspace) {
    fs::write(workspace.root.join("index.php"), "<?php").expect("write");
    let err = workspace
        .access
        .is_empty_dir(Utf8Path::new("index.php"))
        .expect_err("file is not a dir");
    assert!(matches!(err, AccessError::Io { .. }), "err: {err:?}");
}

#[rstest]
fn file_exists_resolves_relative_paths(workspace: Workspace) {
    fs::write(workspace.root.join("index.php"), "<?php").expect("write");
    assert!(workspace.access.file_exists(Utf8Path::new("index.php")).expect("exists"));
    assert!(!workspace.access.file_exists(Utf8Path::new("missing.php")).expect("absent"));
    assert!(!workspace.access.file_exists(Utf8Path::new("no/such/dir.php")).expect("absent parent"));
}

#[rstest]
fn run_script_passes_arguments_and_returns_stdout(workspace: Workspace) {
    let script = workspace.root.join("../helper.sh");
    fs::write(&script, "echo \"$1-$2\"\n").expect("write script");
    let output = workspace
        .access
        .run_script(&script, &["a", "b c"])
        .expect("script should run");
    assert_eq!(output, "a-b c\n");
}

#[rstest]
fn run_script_reports_non_zero_exit(workspace: Workspace) {
    let script = workspace.root.join("../fail.sh");
    fs::write(&script, "echo broken >&2\nexit 4\n").expect("write script");
    let err = workspace
        .access
        .run_script(&script, &[])
        .expect_err("script should fail");
    let AccessError::Script { message, .. } = err else {
        panic!("expected script error, got {err:?}");
    };
    assert!(message.contains("status 4"), "message: {message}");
    assert!(message.contains("broken"), "message: {message}");
}

#[rstest]
fn local_access_offers_a_shell(workspace: Workspace) {
    assert!(workspace.access.supports(Capability::ShellPrompt));
    let shell = workspace
        .access
        .require_shell("crontab")
        .expect("local access has a shell");
    let output = shell
        .shell_exec("echo visible; echo hidden >&2", true)
        .expect("shell line should run");
    assert!(output.contains("visible"));
    assert!(output.contains("hidden"));
}

#[test]
fn connect_fails_when_webroot_parent_is_missing() {
    let instance = Instance::builder()
        .id("ghost")
        .webroot("/definitely/not/here/webroot")
        .build()
        .expect("instance should build");
    let err = LocalAccess::connect(instance, ProcessCommandRunner).expect_err("connect should fail");
    assert!(matches!(err, AccessError::Connection { .. }));
}
