//! Subversion wrapper tests.

use camino::Utf8Path;
use rstest::rstest;

use super::fixtures::{SVN_ROOT, WORKING_COPY, remote_lines, ssh_access, svn_info_xml};
use crate::access::{AccessError, FtpAccess};
use crate::config::FleetConfig;
use crate::instance::{AccessType, Instance};
use crate::test_support::{ScriptedRunner, ScriptedSideChannel};
use crate::vcs::{Svn, VcsError, VersionControl};

#[test]
fn info_normalises_url_root_and_branch() {
    let runner = ScriptedRunner::new();
    runner.push_output(
        Some(0),
        svn_info_xml(&format!("{SVN_ROOT}/branches/2.0"), SVN_ROOT),
        "",
    );
    let access = ssh_access(&runner);
    let svn = Svn::new(&access, "svn", SVN_ROOT).expect("svn wrapper");

    let info = svn.info(Utf8Path::new(WORKING_COPY)).expect("info");

    assert_eq!(info.url, format!("{SVN_ROOT}/branches/2.0"));
    assert_eq!(info.repository_root, SVN_ROOT);
    assert_eq!(info.branch, "branches/2.0");
    assert_eq!(
        remote_lines(&runner),
        vec![format!("svn info --xml --non-interactive {WORKING_COPY}")]
    );
}

#[test]
fn info_unescapes_xml_entities() {
    let runner = ScriptedRunner::new();
    runner.push_output(
        Some(0),
        svn_info_xml("https://svn.example.org/a&amp;b/trunk", "https://svn.example.org/a&amp;b"),
        "",
    );
    let access = ssh_access(&runner);
    let svn = Svn::new(&access, "svn", "https://svn.example.org/a&b").expect("svn wrapper");

    let info = svn.info(Utf8Path::new(WORKING_COPY)).expect("info");
    assert_eq!(info.repository_root, "https://svn.example.org/a&b");
    assert_eq!(info.branch, "trunk");
}

#[test]
fn info_without_url_is_an_info_error() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "<info></info>", "");
    let access = ssh_access(&runner);
    let svn = Svn::new(&access, "svn", SVN_ROOT).expect("svn wrapper");

    assert!(matches!(svn.info(Utf8Path::new(WORKING_COPY)), Err(VcsError::Info(_))));
}

#[rstest]
#[case("--- Merging r5 through r7 into '.':\nC    index.php\nSummary of conflicts:\n  Text conflicts: 1\n", true)]
#[case("   C lib\n", true)]
#[case("  Tree conflicts: 2\n", true)]
#[case("--- Merging r5 through r7 into '.':\nU    Config.php\nA    lib/new.php\n", false)]
#[case("Updated to revision 7.\n", false)]
#[case("Checked out revision 3.\n", false)]
fn conflict_pattern_matches_svn_markers(#[case] output: &str, #[case] expected: bool) {
    let runner = ScriptedRunner::new();
    let access = ssh_access(&runner);
    let svn = Svn::new(&access, "svn", SVN_ROOT).expect("svn wrapper");

    assert_eq!(svn.has_conflicts(output), expected);
}

#[test]
fn switch_targets_path_below_repository_root() {
    let runner = ScriptedRunner::new();
    runner.push_success();
    let access = ssh_access(&runner);
    let svn = Svn::new(&access, "svn", &format!("{SVN_ROOT}/")).expect("svn wrapper");

    svn.switch_to(Utf8Path::new(WORKING_COPY), "/tags/3.1/")
        .expect("switch");

    assert_eq!(
        remote_lines(&runner),
        vec![format!(
            "svn switch --ignore-ancestry --non-interactive '{SVN_ROOT}/tags/3.1' {WORKING_COPY}"
        )]
    );
}

#[test]
fn svn_requires_a_shell() {
    let instance = Instance::builder()
        .id("shop")
        .webroot("/htdocs")
        .web_url("http://shop.example.org")
        .access_type(AccessType::Ftp)
        .host("ftp.example.org")
        .user("shop")
        .password(Some(String::from("pw")))
        .build()
        .expect("instance");
    let runner = ScriptedRunner::new();
    let access = FtpAccess::new(instance, FleetConfig::builtin(), runner.clone(), ScriptedSideChannel::new());

    let result = Svn::new(&access, "svn", SVN_ROOT);

    assert!(matches!(
        result,
        Err(VcsError::Access(AccessError::CapabilityMismatch { .. }))
    ));
    assert!(runner.invocations().is_empty());
}
