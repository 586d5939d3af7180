//! Shared fixtures and helpers for conflict gating scenarios.

use fleetkeeper::access::SshAccess;
use fleetkeeper::config::FleetConfig;
use fleetkeeper::instance::{AccessType, Instance};
use fleetkeeper::test_support::ScriptedRunner;
use fleetkeeper::vcs::{UpdateOutcome, VcsError};
use rstest::fixture;

pub const WORKING_COPY: &str = "/var/www/blog";
pub const REPOSITORY_ROOT: &str = "https://svn.example.org/app";

pub const CONFLICTED_PREVIEW: &str = concat!(
    "--- Merging r5 through r7 into '/var/www/blog':\n",
    "C    index.php\n",
    "Summary of conflicts:\n",
    "  Text conflicts: 1\n",
);

#[derive(Clone, Debug)]
pub enum UpdateResult {
    Done(UpdateOutcome),
    Conflict(String),
    Mismatch(String),
    Failed(String),
}

impl From<Result<UpdateOutcome, VcsError>> for UpdateResult {
    fn from(result: Result<UpdateOutcome, VcsError>) -> Self {
        match result {
            Ok(outcome) => Self::Done(outcome),
            Err(VcsError::Conflict { output, .. }) => Self::Conflict(output),
            Err(err @ VcsError::RepositoryMismatch { .. }) => Self::Mismatch(err.to_string()),
            Err(err) => Self::Failed(err.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct VcsContext {
    pub runner: ScriptedRunner,
    pub result: Option<UpdateResult>,
}

#[fixture]
pub fn vcs_context() -> VcsContext {
    VcsContext {
        runner: ScriptedRunner::new(),
        result: None,
    }
}

pub fn ssh_access(runner: &ScriptedRunner) -> SshAccess<ScriptedRunner> {
    let instance = Instance::builder()
        .id("blog")
        .webroot(WORKING_COPY)
        .access_type(AccessType::Ssh)
        .host("web1")
        .user("deploy")
        .build()
        .unwrap_or_else(|err| panic!("instance should build: {err}"));
    SshAccess::new(instance, FleetConfig::builtin(), runner.clone())
}

pub fn svn_info_xml(url: &str, root: &str) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<info>\n",
            "<entry kind=\"dir\" path=\"{path}\" revision=\"42\">\n",
            "<url>{url}</url>\n<repository>\n<root>{root}</root>\n</repository>\n",
            "</entry>\n</info>\n"
        ),
        path = WORKING_COPY,
        url = url,
        root = root,
    )
}

/// Second word of each remote line, such as `info` or `switch`.
pub fn sent_verbs(runner: &ScriptedRunner) -> Vec<String> {
    runner
        .invocations()
        .iter()
        .filter_map(fleetkeeper::test_support::CommandInvocation::last_arg)
        .filter_map(|line| line.split_whitespace().nth(1).map(str::to_owned))
        .collect()
}
