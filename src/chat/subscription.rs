use std::future::Future;
use tokio::task::JoinHandle;

/// A running observer task with an explicit lifetime
///
/// The task stops when [`Subscription::dispose`] is called or when the
/// subscription is dropped.
#[derive(Debug)]
pub struct Subscription {
    label: String,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Spawns `task` on the current runtime
    pub fn spawn<F>(label: impl Into<String>, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        tracing::debug!("Starting subscription {}", label);
        Self {
            label,
            handle: Some(tokio::spawn(task)),
        }
    }

    /// Name used in logs
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns true until disposed or the task finished on its own
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the task; calling it again is a no-op
    pub fn dispose(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("Disposed subscription {}", self.label);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}
