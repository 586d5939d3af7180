//! Shared fixtures and helpers for drift validation scenarios.

use std::cell::RefCell;
use std::fs::{create_dir_all, write};
use std::rc::Rc;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use fleetkeeper::access::{LocalAccess, ProcessCommandRunner};
use fleetkeeper::checksum::{ChecksumEngine, ChecksumStore, DiffResult, IgnorePattern};
use fleetkeeper::instance::Instance;
use rstest::fixture;
use tempfile::TempDir;

#[derive(Clone, Debug)]
pub enum VerifyOutcome {
    Drift(DiffResult),
    Failure(String),
}

#[derive(Clone, Debug)]
pub struct DriftContext {
    pub webroot: Utf8PathBuf,
    pub engine: Rc<RefCell<ChecksumEngine>>,
    pub version_id: Option<i64>,
    pub outcome: Option<VerifyOutcome>,
    _tmp: Arc<TempDir>,
}

impl DriftContext {
    pub fn access(&self) -> LocalAccess<ProcessCommandRunner> {
        let instance = Instance::builder()
            .id("blog")
            .webroot(self.webroot.as_str())
            .build()
            .unwrap_or_else(|err| panic!("local instance should build: {err}"));
        LocalAccess::new(instance, ProcessCommandRunner)
    }
}

#[fixture]
pub fn drift_context() -> DriftContext {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("create webroot: {err}"));
    let webroot = Utf8PathBuf::from_path_buf(tmp.path().join("www"))
        .unwrap_or_else(|path| panic!("webroot is not utf-8: {}", path.display()));
    create_dir_all(&webroot).unwrap_or_else(|err| panic!("create {webroot}: {err}"));
    let store = ChecksumStore::open_in_memory()
        .unwrap_or_else(|err| panic!("in-memory store should open: {err}"));
    let ignore = IgnorePattern::default_pattern()
        .unwrap_or_else(|err| panic!("default pattern should compile: {err}"));
    DriftContext {
        webroot,
        engine: Rc::new(RefCell::new(ChecksumEngine::new(store, ignore))),
        version_id: None,
        outcome: None,
        _tmp: Arc::new(tmp),
    }
}

pub fn write_file(root: &Utf8Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .unwrap_or_else(|err| panic!("create parent directories for {path}: {err}"));
    }
    write(&path, contents).unwrap_or_else(|err| panic!("write {path}: {err}"));
}
