//! Scoped cleanup for transient remote files.

/// Runs a cleanup action when dropped, on success and error paths alike.
pub(crate) struct CleanupGuard<F: FnOnce()> {
    action: Option<F>,
}

impl<F: FnOnce()> CleanupGuard<F> {
    pub(crate) const fn new(action: F) -> Self {
        Self {
            action: Some(action),
        }
    }
}

impl<F: FnOnce()> Drop for CleanupGuard<F> {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}
