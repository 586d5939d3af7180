//! BDD scenarios for conflict gating.

use rstest_bdd_macros::scenario;

use super::test_helpers::{VcsContext, vcs_context};

#[scenario(
    path = "tests/features/vcs_conflict.feature",
    name = "Aborting on conflict leaves the working copy untouched"
)]
fn scenario_abort_on_conflict(vcs_context: VcsContext) {
    let _ = vcs_context;
}

#[scenario(
    path = "tests/features/vcs_conflict.feature",
    name = "Discarding local changes proceeds with the switch"
)]
fn scenario_discard_and_switch(vcs_context: VcsContext) {
    let _ = vcs_context;
}

#[scenario(
    path = "tests/features/vcs_conflict.feature",
    name = "A foreign repository is refused"
)]
fn scenario_foreign_repository(vcs_context: VcsContext) {
    let _ = vcs_context;
}
