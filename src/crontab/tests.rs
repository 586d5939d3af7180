//! Tests for crontab editing over a scripted shell.

use crate::access::{AccessError, FtpAccess, SshAccess};
use crate::config::FleetConfig;
use crate::crontab::{CrontabError, CrontabManager};
use crate::instance::{AccessType, Instance};
use crate::test_support::{ScriptedRunner, ScriptedSideChannel};

const TABLE: &str = "# nightly jobs\n0 2 * * * php /var/www/blog/cron.php\n\n*/5 * * * * /usr/bin/true\n";

fn ssh_access(runner: &ScriptedRunner) -> SshAccess<ScriptedRunner> {
    let instance = Instance::builder()
        .id("blog")
        .webroot("/var/www/blog")
        .access_type(AccessType::Ssh)
        .host("web1")
        .user("deploy")
        .build()
        .unwrap_or_else(|err| panic!("instance should build: {err}"));
    SshAccess::new(instance, FleetConfig::builtin(), runner.clone())
}

#[test]
fn ftp_access_is_rejected_without_any_call() {
    let runner = ScriptedRunner::new();
    let side_channel = ScriptedSideChannel::new();
    let instance = Instance::builder()
        .id("shop")
        .webroot("/htdocs")
        .web_url("https://shop.example.org/")
        .access_type(AccessType::Ftp)
        .host("ftp.example.org")
        .user("shop")
        .password(Some(String::from("s3cret")))
        .build()
        .unwrap_or_else(|err| panic!("instance should build: {err}"));
    let access = FtpAccess::new(
        instance,
        FleetConfig::builtin(),
        runner.clone(),
        side_channel.clone(),
    );

    let Err(err) = CrontabManager::new(&access, "crontab") else {
        panic!("ftp access must not yield a crontab manager");
    };

    assert!(matches!(
        err,
        CrontabError::Access(AccessError::CapabilityMismatch {
            transport: AccessType::Ftp,
            ..
        })
    ));
    assert!(runner.invocations().is_empty());
    assert!(side_channel.requests().is_empty());
}

#[test]
fn missing_crontab_reads_as_empty() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(1), "", "no crontab for deploy\n");
    let access = ssh_access(&runner);
    let crontab = CrontabManager::new(&access, "crontab").expect("shell available");

    assert_eq!(crontab.read().expect("read"), "");
    assert_eq!(
        runner.invocations().first().and_then(|call| call.last_arg()).as_deref(),
        Some("crontab -l")
    );
}

#[test]
fn other_read_failures_surface_stderr() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(1), "", "crontab: permission denied\n");
    let access = ssh_access(&runner);
    let crontab = CrontabManager::new(&access, "crontab").expect("shell available");

    let err = crontab.read().expect_err("read should fail");

    assert!(matches!(
        err,
        CrontabError::CommandFailure { operation: "read", ref stderr, .. } if stderr.contains("permission denied")
    ));
}

#[test]
fn entries_skip_comments_and_blanks() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), TABLE, "");
    let access = ssh_access(&runner);
    let crontab = CrontabManager::new(&access, "crontab").expect("shell available");

    assert_eq!(
        crontab.entries().expect("entries"),
        vec![
            String::from("0 2 * * * php /var/www/blog/cron.php"),
            String::from("*/5 * * * * /usr/bin/true"),
        ]
    );
}

#[test]
fn add_line_appends_and_writes_through_stdin() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), TABLE, "");
    runner.push_success();
    let access = ssh_access(&runner);
    let crontab = CrontabManager::new(&access, "crontab").expect("shell available");

    let changed = crontab
        .add_line("30 3 * * 0 php /var/www/blog/weekly.php")
        .expect("add");

    assert!(changed);
    let invocations = runner.invocations();
    let write = invocations.get(1).expect("write call");
    assert_eq!(write.last_arg().as_deref(), Some("crontab -"));
    assert_eq!(
        write.stdin.as_deref(),
        Some(format!("{TABLE}30 3 * * 0 php /var/www/blog/weekly.php\n").as_str())
    );
}

#[test]
fn add_line_is_idempotent() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), TABLE, "");
    let access = ssh_access(&runner);
    let crontab = CrontabManager::new(&access, "crontab").expect("shell available");

    let changed = crontab
        .add_line("  */5 * * * * /usr/bin/true ")
        .expect("add");

    assert!(!changed);
    assert_eq!(runner.invocations().len(), 1);
}

#[test]
fn remove_matching_rewrites_remaining_lines() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), TABLE, "");
    runner.push_success();
    let access = ssh_access(&runner);
    let crontab = CrontabManager::new(&access, "crontab").expect("shell available");

    let removed = crontab.remove_matching(r"cron\.php$").expect("remove");

    assert_eq!(removed, 1);
    let invocations = runner.invocations();
    assert_eq!(
        invocations.get(1).and_then(|call| call.stdin.clone()).as_deref(),
        Some("# nightly jobs\n\n*/5 * * * * /usr/bin/true\n")
    );
}

#[test]
fn remove_matching_without_hits_skips_write() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), TABLE, "");
    let access = ssh_access(&runner);
    let crontab = CrontabManager::new(&access, "crontab").expect("shell available");

    assert_eq!(crontab.remove_matching("backup").expect("remove"), 0);
    assert_eq!(runner.invocations().len(), 1);
}

#[test]
fn invalid_pattern_is_reported_before_reading() {
    let runner = ScriptedRunner::new();
    let access = ssh_access(&runner);
    let crontab = CrontabManager::new(&access, "crontab").expect("shell available");

    let err = crontab.remove_matching("(").expect_err("pattern should fail");

    assert!(matches!(err, CrontabError::Pattern { .. }));
    assert!(runner.invocations().is_empty());
}
