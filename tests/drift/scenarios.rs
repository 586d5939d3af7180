//! BDD scenarios for drift validation.

use rstest_bdd_macros::scenario;

use super::test_helpers::{DriftContext, drift_context};

#[scenario(
    path = "tests/features/drift.feature",
    name = "Report added, modified, and deleted files"
)]
fn scenario_report_drift(drift_context: DriftContext) {
    let _ = drift_context;
}

#[scenario(
    path = "tests/features/drift.feature",
    name = "Ignored paths never count as drift"
)]
fn scenario_ignored_paths(drift_context: DriftContext) {
    let _ = drift_context;
}

#[scenario(
    path = "tests/features/drift.feature",
    name = "Verifying an unknown version fails"
)]
fn scenario_unknown_version(drift_context: DriftContext) {
    let _ = drift_context;
}
