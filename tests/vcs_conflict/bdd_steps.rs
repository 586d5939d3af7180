//! BDD step definitions for conflict gating.

use camino::Utf8Path;
use fleetkeeper::vcs::{
    AbortOnConflict, ConflictResolver, DiscardOnConflict, Svn, VcsState, update_instance_to,
};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{
    CONFLICTED_PREVIEW, REPOSITORY_ROOT, UpdateResult, VcsContext, WORKING_COPY, sent_verbs,
    ssh_access, svn_info_xml,
};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("an SVN working copy on trunk of the configured repository")]
fn working_copy_on_trunk(vcs_context: VcsContext) -> VcsContext {
    vcs_context.runner.push_output(
        Some(0),
        svn_info_xml(&format!("{REPOSITORY_ROOT}/trunk"), REPOSITORY_ROOT),
        "",
    );
    vcs_context
}

#[given("an SVN working copy of another repository")]
fn foreign_working_copy(vcs_context: VcsContext) -> VcsContext {
    vcs_context.runner.push_output(
        Some(0),
        svn_info_xml(
            "https://svn.example.org/other/trunk",
            "https://svn.example.org/other",
        ),
        "",
    );
    vcs_context
}

#[given("the dry-run merge reports a text conflict")]
fn dry_run_conflicts(vcs_context: VcsContext) -> VcsContext {
    vcs_context
        .runner
        .push_output(Some(0), CONFLICTED_PREVIEW, "");
    // revert, revert, switch, and cleanup when the operator proceeds;
    // only cleanup is consumed on abort.
    for _ in 0..4 {
        vcs_context.runner.push_success();
    }
    vcs_context
}

fn run_update(
    mut vcs_context: VcsContext,
    target: &str,
    resolver: &dyn ConflictResolver,
) -> VcsContext {
    let access = ssh_access(&vcs_context.runner);
    let result = Svn::new(&access, "svn", REPOSITORY_ROOT).and_then(|svn| {
        update_instance_to(&svn, resolver, Utf8Path::new(WORKING_COPY), target)
    });
    vcs_context.result = Some(UpdateResult::from(result));
    vcs_context
}

#[when("the working copy is updated to \"{target}\" and the operator aborts")]
fn update_and_abort(vcs_context: VcsContext, target: String) -> VcsContext {
    run_update(vcs_context, target.trim(), &AbortOnConflict)
}

#[when("the working copy is updated to \"{target}\" and the operator discards local changes")]
fn update_and_discard(vcs_context: VcsContext, target: String) -> VcsContext {
    run_update(vcs_context, target.trim(), &DiscardOnConflict)
}

#[then("the update fails with a conflict")]
fn fails_with_conflict(vcs_context: &VcsContext) -> Result<(), StepError> {
    match vcs_context.result.as_ref() {
        Some(UpdateResult::Conflict(output)) if output.contains("C    index.php") => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected conflict carrying the tool output, got {other:?}"
        ))),
    }
}

#[then("no update, switch, or revert command was sent")]
fn nothing_mutating_sent(vcs_context: &VcsContext) -> Result<(), StepError> {
    let verbs = sent_verbs(&vcs_context.runner);
    if verbs
        .iter()
        .any(|verb| matches!(verb.as_str(), "update" | "switch" | "revert"))
    {
        return Err(StepError::Assertion(format!(
            "working copy was modified: {verbs:?}"
        )));
    }
    Ok(())
}

#[then("the working copy was cleaned up")]
fn cleaned_up(vcs_context: &VcsContext) -> Result<(), StepError> {
    let verbs = sent_verbs(&vcs_context.runner);
    if verbs.last().map(String::as_str) == Some("cleanup") {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected cleanup as the final command, got {verbs:?}"
        )))
    }
}

#[then("the update switched the working copy")]
fn switched(vcs_context: &VcsContext) -> Result<(), StepError> {
    match vcs_context.result.as_ref() {
        Some(UpdateResult::Done(outcome))
            if outcome.action == VcsState::NeedsUpgrade && outcome.discarded_local_changes =>
        {
            Ok(())
        }
        other => Err(StepError::Assertion(format!(
            "expected an upgrade after discarding changes, got {other:?}"
        ))),
    }
}

#[then("the commands ran in the order \"{order}\"")]
fn commands_in_order(vcs_context: &VcsContext, order: String) -> Result<(), StepError> {
    let expected: Vec<String> = order.split(',').map(|verb| verb.trim().to_owned()).collect();
    let verbs = sent_verbs(&vcs_context.runner);
    if verbs == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, got {verbs:?}"
        )))
    }
}

#[then("the update fails because the repository differs")]
fn fails_on_mismatch(vcs_context: &VcsContext) -> Result<(), StepError> {
    match vcs_context.result.as_ref() {
        Some(UpdateResult::Mismatch(message)) if message.contains("not the same repository") => {
            Ok(())
        }
        other => Err(StepError::Assertion(format!(
            "expected repository mismatch, got {other:?}"
        ))),
    }
}

#[then("only the info command was sent")]
fn only_info_sent(vcs_context: &VcsContext) -> Result<(), StepError> {
    let verbs = sent_verbs(&vcs_context.runner);
    if verbs == [String::from("info")] {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected only info, got {verbs:?}"
        )))
    }
}
