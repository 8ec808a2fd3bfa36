//! In-memory object store
//!
//! Implements [`ObjectStore`] over ordered maps, with the same listing
//! semantics as S3 (`start_after`, delimiter grouping, truncation). Useful
//! for tests and offline runs; it also counts calls per operation and can
//! be told to fail specific operations.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::Cursor;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;

use crate::error::{Error, Result};
use crate::perf::OpKind;
use crate::traits::{
    Body, BucketInfo, GetOutput, ListPage, ListRequest, ObjectDescriptor, ObjectMeta, ObjectStore,
    PutOptions,
};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    mtime: i64,
    content_type: Option<String>,
    storage_class: Option<String>,
    metadata: BTreeMap<String, String>,
}

impl StoredObject {
    fn meta(&self, key: &str) -> ObjectMeta {
        let mut hasher = DefaultHasher::new();
        self.data.hash(&mut hasher);
        ObjectMeta {
            key: key.to_string(),
            size: self.data.len() as u64,
            mtime: self.mtime,
            etag: Some(format!("\"{:016x}\"", hasher.finish())),
            content_type: self.content_type.clone(),
            storage_class: self.storage_class.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Bucket {
    created: i64,
    objects: BTreeMap<String, StoredObject>,
}

/// [`ObjectStore`] kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: RwLock<BTreeMap<String, Bucket>>,
    page_limit: Mutex<Option<usize>>,
    calls: Mutex<HashMap<OpKind, u64>>,
    failures: Mutex<HashSet<(OpKind, String)>>,
}

fn now() -> i64 {
    jiff::Timestamp::now().as_second()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Self::create_bucket`]
    pub fn with_bucket(self, name: &str) -> Self {
        self.create_bucket(name);
        self
    }

    /// Create a bucket; existing buckets are left untouched
    pub fn create_bucket(&self, name: &str) {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        buckets.entry(name.to_string()).or_insert_with(|| Bucket {
            created: now(),
            objects: BTreeMap::new(),
        });
    }

    /// Cap every listing page at `limit` entries regardless of `max_keys`
    pub fn set_page_limit(&self, limit: Option<usize>) {
        *self.page_limit.lock().unwrap_or_else(|e| e.into_inner()) = limit;
    }

    /// Store an object directly, bypassing call counters
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>) -> Result<()> {
        self.insert_at(bucket, key, data, now())
    }

    /// Store an object with an explicit modification time
    pub fn insert_at(&self, bucket: &str, key: &str, data: impl Into<Bytes>, mtime: i64) -> Result<()> {
        let object = StoredObject {
            data: data.into(),
            mtime,
            content_type: None,
            storage_class: None,
            metadata: BTreeMap::new(),
        };
        self.write_bucket(bucket, |b| {
            b.objects.insert(key.to_string(), object);
        })
    }

    /// Raw bytes of an object, bypassing call counters
    pub fn data(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        buckets.get(bucket)?.objects.get(key).map(|o| o.data.clone())
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.data(bucket, key).is_some()
    }

    /// Number of objects in a bucket
    pub fn object_count(&self, bucket: &str) -> usize {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        buckets.get(bucket).map_or(0, |b| b.objects.len())
    }

    /// User metadata stored with an object
    pub fn metadata(&self, bucket: &str, key: &str) -> Option<BTreeMap<String, String>> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        buckets.get(bucket)?.objects.get(key).map(|o| o.metadata.clone())
    }

    /// Calls made so far for one kind of operation
    pub fn calls(&self, op: OpKind) -> u64 {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Total calls across all operations
    pub fn total_calls(&self) -> u64 {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).values().sum()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Make every `op` call on `key` fail with a store error
    pub fn fail_on(&self, op: OpKind, key: &str) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((op, key.to_string()));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn record(&self, op: OpKind, key: &str) -> Result<()> {
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(op)
            .or_insert(0) += 1;

        let failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        if failures.contains(&(op, key.to_string())) {
            return Err(Error::Store(format!("injected {op} failure for {key}")));
        }
        Ok(())
    }

    fn read_object(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        let objects = &buckets
            .get(bucket)
            .ok_or_else(|| Error::NotFound(bucket.to_string()))?
            .objects;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{bucket}/{key}")))
    }

    fn write_bucket<T>(&self, bucket: &str, f: impl FnOnce(&mut Bucket) -> T) -> Result<T> {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        let bucket = buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::NotFound(bucket.to_string()))?;
        Ok(f(bucket))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.record(OpKind::List, "")?;
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        Ok(buckets
            .iter()
            .map(|(name, b)| BucketInfo {
                name: name.clone(),
                created: jiff::Timestamp::from_second(b.created).ok(),
            })
            .collect())
    }

    async fn list_objects(&self, bucket: &str, request: &ListRequest) -> Result<ListPage> {
        self.record(OpKind::List, &request.prefix)?;

        let page_limit = *self.page_limit.lock().unwrap_or_else(|e| e.into_inner());
        let mut limit = request.max_keys.max(1) as usize;
        if let Some(cap) = page_limit {
            limit = limit.min(cap.max(1));
        }

        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        let objects = &buckets
            .get(bucket)
            .ok_or_else(|| Error::NotFound(bucket.to_string()))?
            .objects;

        let prefix = request.prefix.as_str();
        let mut page = ListPage::default();
        let mut count = 0;

        let candidates = objects.iter().filter(|(key, _)| {
            key.starts_with(prefix)
                && request
                    .start_after
                    .as_deref()
                    .is_none_or(|after| key.as_str() > after)
        });

        for (key, object) in candidates {
            let group = request.delimiter.as_deref().and_then(|delim| {
                key[prefix.len()..]
                    .find(delim)
                    .map(|idx| &key[..prefix.len() + idx + delim.len()])
            });

            if let Some(group) = group
                && page.common_prefixes.last().map(String::as_str) == Some(group)
            {
                continue;
            }
            if count == limit {
                page.is_truncated = true;
                break;
            }
            count += 1;

            match group {
                Some(group) => page.common_prefixes.push(group.to_string()),
                None => page.entries.push(ObjectDescriptor::new(
                    key.clone(),
                    object.data.len() as u64,
                    object.mtime,
                )),
            }
        }

        Ok(page)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        self.record(OpKind::Head, key)?;
        Ok(self.read_object(bucket, key)?.meta(key))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<GetOutput> {
        self.record(OpKind::Get, key)?;
        let object = self.read_object(bucket, key)?;
        Ok(GetOutput {
            meta: object.meta(key),
            body: Box::pin(Cursor::new(object.data)),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Body,
        options: &PutOptions,
    ) -> Result<ObjectMeta> {
        self.record(OpKind::Put, key)?;
        let data = match body {
            Body::Bytes(data) => data,
            Body::Stream { mut reader, .. } => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Bytes::from(buf)
            }
        };
        let object = StoredObject {
            data,
            mtime: now(),
            content_type: options.content_type.clone(),
            storage_class: options.storage_class.clone(),
            metadata: options.metadata.clone(),
        };
        let meta = object.meta(key);
        self.write_bucket(bucket, |b| {
            b.objects.insert(key.to_string(), object);
        })?;
        Ok(meta)
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dest_bucket: &str,
        dest_key: &str,
        options: &PutOptions,
    ) -> Result<ObjectMeta> {
        self.record(OpKind::Copy, src_key)?;
        let source = self.read_object(src_bucket, src_key)?;
        let (content_type, metadata) = if options.replaces_metadata() {
            (options.content_type.clone(), options.metadata.clone())
        } else {
            (source.content_type, source.metadata)
        };
        let object = StoredObject {
            data: source.data,
            mtime: now(),
            content_type,
            storage_class: options.storage_class.clone(),
            metadata,
        };
        let meta = object.meta(dest_key);
        self.write_bucket(dest_bucket, |b| {
            b.objects.insert(dest_key.to_string(), object);
        })?;
        Ok(meta)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.record(OpKind::Delete, key)?;
        self.write_bucket(bucket, |b| {
            b.objects.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prefix: &str, max_keys: i32, start_after: Option<&str>) -> ListRequest {
        ListRequest {
            prefix: prefix.to_string(),
            max_keys,
            start_after: start_after.map(String::from),
            delimiter: None,
        }
    }

    #[tokio::test]
    async fn test_list_pages_with_start_after() {
        let store = MemoryStore::new().with_bucket("b");
        for key in ["a", "b", "c", "d", "e"] {
            store.insert("b", key, "x").unwrap();
        }

        let page = store.list_objects("b", &request("", 2, None)).await.unwrap();
        assert_eq!(page.entries.len(), 2);
        assert!(page.is_truncated);

        let page = store.list_objects("b", &request("", 2, Some("d"))).await.unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].key, "e");
        assert!(!page.is_truncated);

        store.set_page_limit(Some(1));
        let page = store.list_objects("b", &request("", 1000, None)).await.unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(store.calls(OpKind::List), 3);
    }

    #[tokio::test]
    async fn test_list_delimiter_groups() {
        let store = MemoryStore::new().with_bucket("b");
        for key in ["p/a/1", "p/a/2", "p/b", "p/c/1"] {
            store.insert("b", key, "x").unwrap();
        }
        let mut req = request("p/", 100, None);
        req.delimiter = Some("/".into());
        let page = store.list_objects("b", &req).await.unwrap();
        assert_eq!(page.common_prefixes, vec!["p/a/", "p/c/"]);
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].key, "p/b");
    }

    #[tokio::test]
    async fn test_missing_key_and_bucket() {
        let store = MemoryStore::new().with_bucket("b");
        assert!(store.head_object("b", "nope").await.unwrap_err().is_not_found());
        assert!(store.get_object("x", "nope").await.unwrap_err().is_not_found());
        store.delete_object("b", "nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_copy_does_not_keep_storage_class() {
        let store = MemoryStore::new().with_bucket("b");
        let options = PutOptions {
            storage_class: Some("GLACIER".into()),
            ..Default::default()
        };
        store.put_object("b", "src", Body::from(b"data".to_vec()), &options).await.unwrap();
        let meta = store
            .copy_object("b", "src", "b", "dst", &PutOptions::default())
            .await
            .unwrap();
        assert_eq!(meta.size, 4);
        assert_eq!(meta.storage_class, None);
        assert_eq!(store.data("b", "dst").unwrap(), Bytes::from_static(b"data"));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryStore::new().with_bucket("b");
        store.insert("b", "k", "x").unwrap();
        store.fail_on(OpKind::Delete, "k");
        let err = store.delete_object("b", "k").await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert!(store.contains("b", "k"));

        store.clear_failures();
        store.delete_object("b", "k").await.unwrap();
        assert!(!store.contains("b", "k"));
    }
}
