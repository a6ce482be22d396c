use tokio::task::JoinHandle;

/// Owned handle of a spawned countdown; dropping it aborts the task.
#[derive(Debug, Default)]
pub struct TimerTask(Option<JoinHandle<()>>);

impl TimerTask {
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self(Some(handle))
    }

    /// Release the task without aborting it.
    ///
    /// Used by the countdown itself before it ends the round it belongs to.
    pub fn detach(&mut self) {
        self.0.take();
    }

    /// Whether a task is still attached to this handle.
    pub fn is_attached(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TimerTask {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}
