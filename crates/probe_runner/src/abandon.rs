//! Cleanup for container runs whose future is dropped mid-flight.

/// Calls `on_abandon` when dropped before [`complete`](Self::complete).
///
/// A cancelled `select!` drops the run future at its current await point, so
/// cleanup for a still-running container has to hang off `Drop`.
pub(crate) struct AbandonGuard<F: FnOnce()> {
    on_abandon: Option<F>,
}

impl<F: FnOnce()> AbandonGuard<F> {
    pub(crate) fn new(on_abandon: F) -> Self {
        Self {
            on_abandon: Some(on_abandon),
        }
    }

    /// The run finished on its own; nothing to clean up.
    pub(crate) fn complete(mut self) {
        self.on_abandon = None;
    }
}

impl<F: FnOnce()> Drop for AbandonGuard<F> {
    fn drop(&mut self) {
        if let Some(on_abandon) = self.on_abandon.take() {
            on_abandon();
        }
    }
}
