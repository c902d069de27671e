use tokio::task::JoinHandle;

// Dropping the subscription stops the listener.
#[derive(Debug)]
pub struct PasteSubscription {
    handle: Option<JoinHandle<()>>,
}

impl PasteSubscription {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("Paste listener released");
        }
    }
}

impl Drop for PasteSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
