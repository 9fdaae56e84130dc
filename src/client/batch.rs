//! Request de-duplication.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::counter;
use tokio::time::sleep;
use tracing::debug;

const SOURCE: &str = "client::batch";

type PendingRequest<T> = Shared<BoxFuture<'static, T>>;

/// Collapses concurrent calls that share a key into one in-flight operation.
///
/// The first caller for a key schedules the operation after the debounce
/// window; every caller arriving before it settles awaits the same shared
/// future. The entry is removed when the operation settles, whatever the
/// outcome, so the next call starts fresh.
pub struct RequestBatcher<T> {
    window: Duration,
    pending: Arc<DashMap<String, PendingRequest<T>>>,
}

impl<T> RequestBatcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Number of keys with an operation in flight.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub async fn batch_request<F, Fut>(&self, key: &str, factory: F) -> T
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let request = match self.pending.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                counter!("pressroom_batch_join_total").increment(1);
                debug!(target = SOURCE, key, "joined in-flight request");
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                let pending = Arc::clone(&self.pending);
                let owned_key = key.to_string();
                let window = self.window;
                let request = async move {
                    sleep(window).await;
                    let output = factory().await;
                    pending.remove(&owned_key);
                    output
                }
                .boxed()
                .shared();
                slot.insert(request.clone());
                request
            }
        };

        request.await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::join_all;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_invocation() {
        let batcher = RequestBatcher::<Result<u32, String>>::new(Duration::from_millis(50));
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..5).map(|_| {
            let calls = Arc::clone(&calls);
            batcher.batch_request("posts:{}", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
        });
        let results = join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|result| *result == Ok(7)));
        assert_eq!(batcher.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_failure_is_not_reused() {
        let batcher = RequestBatcher::<Result<u32, String>>::new(Duration::from_millis(50));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let calls = Arc::clone(&calls);
            batcher
                .batch_request("tags:{}", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("unavailable".to_string())
                })
                .await
        };
        assert!(first.is_err());
        assert_eq!(batcher.pending(), 0);

        let second = {
            let calls = Arc::clone(&calls);
            batcher
                .batch_request("tags:{}", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await
        };
        assert_eq!(second, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_run_independently() {
        let batcher = RequestBatcher::<u32>::new(Duration::from_millis(50));

        let (a, b) = tokio::join!(
            batcher.batch_request("a", || async { 1 }),
            batcher.batch_request("b", || async { 2 }),
        );

        assert_eq!((a, b), (1, 2));
    }
}
