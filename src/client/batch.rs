//! Bounded fan-out for many independent calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{ClientError, Result};

/// Chunking parameters for [`run_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Tasks running at the same time
    pub max_concurrency: usize,
    /// Pause between consecutive chunks
    pub batch_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            batch_delay: Duration::from_millis(100),
        }
    }
}

/// Runs `f` over `items` in chunks of `max_concurrency` tasks, pausing
/// `batch_delay` between chunks. Results come back in input order.
///
/// A panicking task fails the whole batch with [`ClientError::Internal`].
pub async fn run_batch<T, R, F, Fut>(items: Vec<T>, options: BatchOptions, f: F) -> Result<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let chunk_size = options.max_concurrency.max(1);
    let total = items.len();
    let f = Arc::new(f);
    let mut results = Vec::with_capacity(total);
    let mut items = items.into_iter().peekable();
    let mut chunk_index = 0usize;

    while items.peek().is_some() {
        if chunk_index > 0 && !options.batch_delay.is_zero() {
            tokio::time::sleep(options.batch_delay).await;
        }

        let handles: Vec<_> = items
            .by_ref()
            .take(chunk_size)
            .map(|item| {
                let f = f.clone();
                tokio::spawn(async move { (*f)(item).await })
            })
            .collect();

        debug!(chunk = chunk_index, tasks = handles.len(), total, "Running batch chunk");

        for handle in handles {
            let result = handle
                .await
                .map_err(|e| ClientError::Internal(format!("batch task failed: {}", e)))?;
            results.push(result);
        }

        chunk_index += 1;
    }

    Ok(results)
}
