//! Supervised background persistence writes.
//!
//! Storage collaborators are synchronous and must never stall the relay
//! path. Every write goes through [`spawn_write`], which runs the closure
//! on the blocking pool inside its own error boundary: a failed write is
//! logged and the relay never learns about it.

use tracing::error;

/// Run a storage write off the relay path.
pub fn spawn_write<F>(label: &'static str, write: F)
where
    F: FnOnce() -> ringline_store::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        if let Err(e) = write() {
            error!(task = label, error = %e, "Background persistence write failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_spawn_write_runs() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        spawn_write("test", move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        // Let the blocking pool run the task.
        tokio::task::yield_now().await;
        for _ in 0..50 {
            if ran.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_spawn_write_error_is_contained() {
        // A failing write must not panic or propagate.
        spawn_write("test-fail", || Err(ringline_store::StoreError::NotFound));
        tokio::task::yield_now().await;
    }
}
