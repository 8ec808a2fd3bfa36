//! Store decorator reporting every primitive call to a [`PerfTracker`]

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::Result;
use crate::perf::{OpKind, PerfTracker};
use crate::traits::{Body, BucketInfo, GetOutput, ListPage, ListRequest, ObjectMeta, ObjectStore, PutOptions};

/// Wraps any [`ObjectStore`] and brackets each call with
/// [`PerfTracker::begin`] / [`PerfTracker::end`]
pub struct InstrumentedStore {
    inner: Arc<dyn ObjectStore>,
    tracker: Arc<dyn PerfTracker>,
}

impl InstrumentedStore {
    pub fn new(inner: Arc<dyn ObjectStore>, tracker: Arc<dyn PerfTracker>) -> Self {
        Self { inner, tracker }
    }

    /// Get the wrapped store
    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.inner
    }

    async fn track<T, F>(&self, op: OpKind, key: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.tracker.begin(op, key);
        let start = Instant::now();
        let result = call.await;
        let elapsed = start.elapsed();
        self.tracker.end(op, key, elapsed, result.is_ok());
        tracing::debug!(op = op.as_str(), key, elapsed_ms = elapsed.as_millis() as u64, ok = result.is_ok(), "store call");
        result
    }
}

#[async_trait]
impl ObjectStore for InstrumentedStore {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.track(OpKind::List, "", self.inner.list_buckets()).await
    }

    async fn list_objects(&self, bucket: &str, request: &ListRequest) -> Result<ListPage> {
        self.track(OpKind::List, &request.prefix, self.inner.list_objects(bucket, request))
            .await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        self.track(OpKind::Head, key, self.inner.head_object(bucket, key)).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<GetOutput> {
        self.track(OpKind::Get, key, self.inner.get_object(bucket, key)).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Body,
        options: &PutOptions,
    ) -> Result<ObjectMeta> {
        self.track(OpKind::Put, key, self.inner.put_object(bucket, key, body, options))
            .await
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dest_bucket: &str,
        dest_key: &str,
        options: &PutOptions,
    ) -> Result<ObjectMeta> {
        self.track(
            OpKind::Copy,
            src_key,
            self.inner
                .copy_object(src_bucket, src_key, dest_bucket, dest_key, options),
        )
        .await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.track(OpKind::Delete, key, self.inner.delete_object(bucket, key))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::perf::PerfStats;

    #[tokio::test]
    async fn test_records_success_and_failure() {
        let memory = Arc::new(MemoryStore::new().with_bucket("b"));
        memory.insert("b", "k", "v").unwrap();
        let stats = Arc::new(PerfStats::new());
        let store = InstrumentedStore::new(memory, stats.clone());

        store.head_object("b", "k").await.unwrap();
        assert!(store.head_object("b", "missing").await.is_err());
        store.delete_object("b", "k").await.unwrap();

        let head = stats.get(OpKind::Head);
        assert_eq!(head.calls, 2);
        assert_eq!(head.failures, 1);
        assert_eq!(stats.get(OpKind::Delete).calls, 1);
        assert_eq!(stats.get(OpKind::Get).calls, 0);
    }
}
