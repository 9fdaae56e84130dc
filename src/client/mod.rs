//! Client-side data access: query facade over the hosted data service.
//!
//! [`DataClient`] is the context object every domain operation receives. It
//! owns the TTL cache, the request de-duplicator and the retry policy, and
//! talks to the backend through the [`DataService`] trait so tests can swap in
//! an in-memory service.

mod batch;
mod error;
mod query;
mod retry;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheConfig, CacheStore, QueryKey};

pub use batch::RequestBatcher;
pub use error::{Retryable, ServiceError};
pub use query::{
    DEFAULT_PAGE_WIDTH, Filter, Operator, Order, QueryOptions, RowRange, SelectRequest,
};
pub use retry::{RetryPolicy, with_retry};

const SOURCE: &str = "client";

/// Row-oriented access to the hosted data service.
#[async_trait]
pub trait DataService: Send + Sync {
    async fn select(&self, request: &SelectRequest) -> Result<Vec<Value>, ServiceError>;

    /// Insert rows, merging with existing rows that share a primary key.
    /// Returns the stored representation.
    async fn upsert(&self, resource: &str, rows: Vec<Value>) -> Result<Vec<Value>, ServiceError>;

    /// Plain insert. Services without a distinct insert path fall back to
    /// [`upsert`](Self::upsert).
    async fn insert(&self, resource: &str, rows: Vec<Value>) -> Result<Vec<Value>, ServiceError> {
        self.upsert(resource, rows).await
    }

    async fn delete(
        &self,
        resource: &str,
        filters: &BTreeMap<String, Filter>,
    ) -> Result<(), ServiceError>;
}

type QueryResult = Result<Vec<Value>, ServiceError>;

pub struct DataClient {
    service: Arc<dyn DataService>,
    cache: CacheStore,
    cache_enabled: bool,
    batcher: RequestBatcher<QueryResult>,
    retry: RetryPolicy,
}

impl DataClient {
    pub fn new(service: Arc<dyn DataService>, cache: &CacheConfig, retry: RetryPolicy) -> Self {
        Self {
            service,
            cache: CacheStore::new(cache.ttl()),
            cache_enabled: cache.enabled,
            batcher: RequestBatcher::new(cache.batch_window()),
            retry,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run a read query, serving it from the cache when possible.
    ///
    /// Misses go through the request de-duplicator when `options.batch` is
    /// set and through the retry executor otherwise.
    pub async fn optimized_query(&self, resource: &str, options: QueryOptions) -> QueryResult {
        let key = QueryKey::new(resource, &options);
        let use_cache = self.cache_enabled && options.cache;

        if use_cache && let Some(Value::Array(rows)) = self.cache.get(key.as_str()) {
            debug!(target = SOURCE, key = key.as_str(), "query served from cache");
            return Ok(rows);
        }

        let request = options.to_request(resource);
        let rows = if options.batch {
            let service = Arc::clone(&self.service);
            self.batcher
                .batch_request(key.as_str(), move || async move {
                    service.select(&request).await
                })
                .await?
        } else {
            with_retry(&self.retry, || self.service.select(&request)).await?
        };

        if use_cache {
            self.cache.set(key.as_str(), Value::Array(rows.clone()));
        }
        Ok(rows)
    }

    /// [`optimized_query`](Self::optimized_query) with rows decoded into `T`.
    pub async fn query_as<T: DeserializeOwned>(
        &self,
        resource: &str,
        options: QueryOptions,
    ) -> Result<Vec<T>, ServiceError> {
        self.optimized_query(resource, options)
            .await?
            .into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|err| ServiceError::decode(format!("{resource} row: {err}")))
            })
            .collect()
    }

    pub async fn upsert(&self, resource: &str, rows: Vec<Value>) -> QueryResult {
        with_retry(&self.retry, || self.service.upsert(resource, rows.clone())).await
    }

    pub async fn insert_many(&self, resource: &str, rows: Vec<Value>) -> QueryResult {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        with_retry(&self.retry, || self.service.insert(resource, rows.clone())).await
    }

    pub async fn delete_where(
        &self,
        resource: &str,
        filters: BTreeMap<String, Filter>,
    ) -> Result<(), ServiceError> {
        if filters.is_empty() {
            return Err(ServiceError::invalid_request(format!(
                "refusing unfiltered delete on `{resource}`"
            )));
        }
        with_retry(&self.retry, || self.service.delete(resource, &filters)).await
    }

    /// Drop cached results whose key contains `pattern` (all when `None`).
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        self.cache.invalidate(pattern)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct CountingService {
        selects: AtomicUsize,
        fail_with: Option<ServiceError>,
    }

    #[async_trait]
    impl DataService for CountingService {
        async fn select(&self, request: &SelectRequest) -> Result<Vec<Value>, ServiceError> {
            self.selects.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            Ok(vec![json!({ "resource": request.resource })])
        }

        async fn upsert(&self, _: &str, rows: Vec<Value>) -> Result<Vec<Value>, ServiceError> {
            Ok(rows)
        }

        async fn delete(
            &self,
            _: &str,
            _: &BTreeMap<String, Filter>,
        ) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    fn client(service: Arc<CountingService>) -> DataClient {
        DataClient::new(
            service,
            &CacheConfig::default(),
            RetryPolicy::new(3, Duration::from_millis(10)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_cached_query_hits_service_once() {
        let service = Arc::new(CountingService::default());
        let client = client(Arc::clone(&service));
        let options = QueryOptions::new()
            .filter("status", json!("published"))
            .limit(2)
            .cache(true);

        let first = client.optimized_query("posts", options.clone()).await.unwrap();
        let second = client.optimized_query("posts", options).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.selects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn uncached_query_always_reaches_service() {
        let service = Arc::new(CountingService::default());
        let client = client(Arc::clone(&service));

        for _ in 0..3 {
            client
                .optimized_query("tags", QueryOptions::new().cache(false))
                .await
                .unwrap();
        }

        assert_eq!(service.selects.load(Ordering::SeqCst), 3);
        assert!(client.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_forces_refetch() {
        let service = Arc::new(CountingService::default());
        let client = client(Arc::clone(&service));

        client.optimized_query("posts", QueryOptions::new()).await.unwrap();
        assert_eq!(client.invalidate(Some("posts")), 1);
        client.optimized_query("posts", QueryOptions::new()).await.unwrap();

        assert_eq!(service.selects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_batched_reads_retry_transient_failures() {
        let service = Arc::new(CountingService {
            fail_with: Some(ServiceError::status(502, None, "bad gateway")),
            ..Default::default()
        });
        let client = client(Arc::clone(&service));

        let err = client
            .optimized_query("posts", QueryOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(502));
        assert_eq!(service.selects.load(Ordering::SeqCst), 3);
        assert!(client.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unfiltered_delete_is_rejected() {
        let client = client(Arc::new(CountingService::default()));
        let err = client.delete_where("posts", BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }
}
