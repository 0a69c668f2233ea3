use tokio::time::Instant;
use tracing::trace;

/// Logs the wall time of a store operation when dropped
pub(crate) struct ScopedTimer {
    start: Instant,
    operation: &'static str,
}

impl ScopedTimer {
    pub(crate) fn new(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        trace!(target: "timing", operation = self.operation, elapsed_ms = elapsed.as_millis() as u64, "Store operation finished");
    }
}
