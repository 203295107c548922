//! Time-boxed collaborator calls.

use crate::error::{Result, SiftError};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

/// Run a blocking computation on the blocking pool under a timeout.
///
/// A computation that outlives the timeout keeps its thread until it
/// returns; its result is dropped.
///
/// # Errors
///
/// Returns [`SiftError::CollaboratorTimeout`] on expiry, a collaborator
/// error if the task panicked, or whatever the computation returned.
pub async fn run_blocking_with_timeout<T, F>(
    collaborator: &str,
    timeout: Duration,
    work: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let start = Instant::now();
    let task = tokio::task::spawn_blocking(work);

    let result = tokio::time::timeout(timeout, task).await;
    debug!(
        "Collaborator '{}' returned after {}ms",
        collaborator,
        start.elapsed().as_millis()
    );

    match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => Err(SiftError::collaborator(
            collaborator,
            format!("task panicked: {e}"),
        )),
        Err(_elapsed) => Err(timed_out(collaborator, timeout)),
    }
}

/// Await a future under a timeout. Dropping the future on expiry cancels it.
///
/// # Errors
///
/// Returns [`SiftError::CollaboratorTimeout`] on expiry or whatever the
/// future returned.
pub async fn run_with_timeout<T, F>(collaborator: &str, timeout: Duration, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, work).await {
        Ok(outcome) => outcome,
        Err(_elapsed) => Err(timed_out(collaborator, timeout)),
    }
}

fn timed_out(collaborator: &str, timeout: Duration) -> SiftError {
    SiftError::CollaboratorTimeout {
        collaborator: collaborator.to_string(),
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}
