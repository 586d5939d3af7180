//! BDD step definitions for drift validation.

use std::fs::remove_file;

use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{DriftContext, VerifyOutcome, write_file};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a local instance with an index page and a library file")]
fn instance_with_files(drift_context: DriftContext) -> DriftContext {
    write_file(&drift_context.webroot, "index.php", "<?php echo 'home';");
    write_file(&drift_context.webroot, "lib/a.php", "<?php function a() {}");
    drift_context
}

#[given("a baseline recorded as \"{label}\"")]
fn baseline_recorded(mut drift_context: DriftContext, label: String) -> DriftContext {
    let access = drift_context.access();
    let version = drift_context
        .engine
        .borrow_mut()
        .record_baseline(&access, label.trim())
        .unwrap_or_else(|err| panic!("baseline should record: {err}"));
    drift_context.version_id = Some(version.id);
    drift_context
}

#[when("the library file is modified")]
fn library_modified(drift_context: DriftContext) -> DriftContext {
    write_file(&drift_context.webroot, "lib/a.php", "<?php function a() { evil(); }");
    drift_context
}

#[when("the index page is deleted")]
fn index_deleted(drift_context: DriftContext) -> DriftContext {
    let path = drift_context.webroot.join("index.php");
    remove_file(&path).unwrap_or_else(|err| panic!("remove {path}: {err}"));
    drift_context
}

#[when("a new file \"{name}\" appears")]
fn new_file_appears(drift_context: DriftContext, name: String) -> DriftContext {
    write_file(&drift_context.webroot, name.trim(), "<?php system($_GET['c']);");
    drift_context
}

#[when("a cache file is written under \"{folder}\"")]
fn cache_written(drift_context: DriftContext, folder: String) -> DriftContext {
    let relative = format!("{}/cache.bin", folder.trim());
    write_file(&drift_context.webroot, &relative, "cached");
    drift_context
}

#[when("the instance is verified against the baseline")]
fn verify_against_baseline(mut drift_context: DriftContext) -> DriftContext {
    let version_id = drift_context
        .version_id
        .unwrap_or_else(|| panic!("test setup requires a recorded baseline"));
    drift_context.outcome = Some(verify(&drift_context, version_id));
    drift_context
}

#[when("the instance is verified against version {version:i64}")]
fn verify_against_version(mut drift_context: DriftContext, version: i64) -> DriftContext {
    drift_context.outcome = Some(verify(&drift_context, version));
    drift_context
}

fn verify(drift_context: &DriftContext, version_id: i64) -> VerifyOutcome {
    let access = drift_context.access();
    match drift_context
        .engine
        .borrow()
        .verify_instance(&access, version_id)
    {
        Ok(result) => VerifyOutcome::Drift(result),
        Err(err) => VerifyOutcome::Failure(err.to_string()),
    }
}

fn drift(drift_context: &DriftContext) -> Result<&fleetkeeper::checksum::DiffResult, StepError> {
    match drift_context.outcome.as_ref() {
        Some(VerifyOutcome::Drift(result)) => Ok(result),
        Some(VerifyOutcome::Failure(message)) => Err(StepError::Assertion(format!(
            "expected drift result, got failure: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the drift reads \"{expected}\"")]
fn drift_reads(drift_context: &DriftContext, expected: String) -> Result<(), StepError> {
    let result = drift(drift_context)?;
    let actual = result.change_lines().join(", ");
    if actual == expected.trim() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected drift {expected:?}, got {actual:?}"
        )))
    }
}

#[then("the instance is clean")]
fn instance_clean(drift_context: &DriftContext) -> Result<(), StepError> {
    let result = drift(drift_context)?;
    if result.is_clean() && result.pristine.len() == 2 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected a clean instance with two pristine files, got {result:?}"
        )))
    }
}

#[then("verification fails naming version {version:i64}")]
fn verification_fails(drift_context: &DriftContext, version: i64) -> Result<(), StepError> {
    let Some(VerifyOutcome::Failure(message)) = drift_context.outcome.as_ref() else {
        return Err(StepError::Assertion(format!(
            "expected failure, got {:?}",
            drift_context.outcome
        )));
    };
    if message.contains(&version.to_string()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected error naming version {version}, got: {message}"
        )))
    }
}
