use std::sync::atomic::{AtomicU64, Ordering};

/// Request and error tallies for one server.
///
/// Created with the [`Application`](crate::app::Application), shared with the
/// dispatcher, and never reset while the server lives. Reads are atomic but
/// carry no ordering guarantee relative to in-flight requests.
#[derive(Debug, Default)]
pub struct GlobalState {
    request_count: AtomicU64,
    error_count: AtomicU64,
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub(crate) fn add_request_count(&self, n: u64) -> u64 {
        self.request_count.fetch_add(n, Ordering::Relaxed) + n
    }

    pub(crate) fn add_error_count(&self, n: u64) -> u64 {
        self.error_count.fetch_add(n, Ordering::Relaxed) + n
    }
}
