//! The chunk emission callback shared by both chunkers.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::ChunkError;
use crate::model::Chunk;

/// Invoked exactly once per emitted chunk. Returning an error aborts the
/// run: the Concurrency Gate short-circuits, though workers already
/// in flight are still allowed to finish.
pub type ChunkCallback = Arc<dyn Fn(Chunk) -> BoxFuture<'static, Result<(), ChunkError>> + Send + Sync>;

/// Wraps a synchronous-looking async closure into a [`ChunkCallback`].
pub fn boxed<F, Fut>(f: F) -> ChunkCallback
where
    F: Fn(Chunk) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), ChunkError>> + Send + 'static,
{
    Arc::new(move |chunk| Box::pin(f(chunk)))
}
