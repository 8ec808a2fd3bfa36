//! JSON records on top of the transfer primitive
//!
//! Reads go through the [`ReadCache`] when one is configured and the key
//! matches its pattern. Writes always go to the store; the cache is only
//! updated after a write succeeds.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;

use crate::cache::ReadCache;
use crate::error::{Error, Result};
use crate::jsonpath::{self, Update};
use crate::traits::{ObjectMeta, PutOptions};
use crate::transfer::{GetOptions, Transfer, UploadOptions};

/// Content type of every record written
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Where a record came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordMeta {
    /// Served from the cache; no store call was made
    Cached,
    /// Fetched from the store
    Stored(ObjectMeta),
}

/// A decoded record
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub value: Arc<Value>,
    pub meta: RecordMeta,
}

impl Record {
    pub fn is_cached(&self) -> bool {
        matches!(self.meta, RecordMeta::Cached)
    }
}

/// Serialize a record, pretty output indented with tabs
pub fn encode(value: &Value, pretty: bool) -> Result<Bytes> {
    if !pretty {
        return Ok(Bytes::from(serde_json::to_vec(value)?));
    }
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"\t"));
    value.serialize(&mut serializer)?;
    Ok(Bytes::from(out))
}

/// JSON key/value access to one store
#[derive(Clone)]
pub struct JsonCodec {
    transfer: Transfer,
    cache: Option<Arc<ReadCache>>,
}

impl JsonCodec {
    pub fn new(transfer: Transfer, cache: Option<Arc<ReadCache>>) -> Self {
        Self { transfer, cache }
    }

    pub fn cache(&self) -> Option<&Arc<ReadCache>> {
        self.cache.as_ref()
    }

    /// Cache and its entry key, when `key` is cacheable
    fn cache_slot(&self, bucket: &str, key: &str) -> Option<(&ReadCache, String)> {
        self.cache
            .as_deref()
            .filter(|cache| cache.matches(key))
            .map(|cache| (cache, format!("{bucket}/{key}")))
    }

    /// Read and decode a record
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Record> {
        let slot = self.cache_slot(bucket, key);
        if let Some((cache, entry)) = &slot
            && let Some(value) = cache.get(entry)
        {
            tracing::debug!(bucket, key, "cache hit");
            return Ok(Record {
                value,
                meta: RecordMeta::Cached,
            });
        }

        let (meta, data) = self
            .transfer
            .get_bytes(bucket, key, &GetOptions::default())
            .await?;
        let value: Value = serde_json::from_slice(&data)
            .map_err(|source| Error::Parse {
                key: key.to_string(),
                source,
            })
            .inspect_err(|e| e.log("err_json", key))?;

        let value = Arc::new(value);
        if let Some((cache, entry)) = &slot {
            cache.set(entry, value.clone());
        }
        Ok(Record {
            value,
            meta: RecordMeta::Stored(meta),
        })
    }

    /// Value at a dot path inside a record
    pub async fn get_path(&self, bucket: &str, key: &str, path: &str) -> Result<Option<Value>> {
        let record = self.get(bucket, key).await?;
        Ok(jsonpath::lookup(&record.value, path).cloned())
    }

    /// Encode and store a record
    pub async fn put(&self, bucket: &str, key: &str, value: &Value, pretty: bool) -> Result<ObjectMeta> {
        let data = encode(value, pretty).inspect_err(|e| e.log("err_json", key))?;
        let options = UploadOptions {
            put: PutOptions::default().with_content_type(JSON_CONTENT_TYPE),
            ..Default::default()
        };
        let meta = self.transfer.put_bytes(bucket, key, data, &options).await?;

        if let Some((cache, entry)) = self.cache_slot(bucket, key) {
            cache.set(&entry, Arc::new(value.clone()));
        }
        Ok(meta)
    }

    /// Read, edit by dot paths, write back; a missing record is NotFound
    ///
    /// Not transactional: a concurrent writer between the read and the
    /// write is overwritten.
    pub async fn update(&self, bucket: &str, key: &str, updates: Vec<(String, Update)>, pretty: bool) -> Result<Value> {
        let record = self.get(bucket, key).await?;
        let mut value = Value::clone(&record.value);
        self.write_updated(bucket, key, &mut value, updates, pretty).await?;
        Ok(value)
    }

    /// Like [`Self::update`], starting from `{}` when the record is missing
    pub async fn update_or_create(
        &self,
        bucket: &str,
        key: &str,
        updates: Vec<(String, Update)>,
        pretty: bool,
    ) -> Result<Value> {
        let mut value = match self.get(bucket, key).await {
            Ok(record) => Value::clone(&record.value),
            Err(e) if e.is_not_found() => Value::Object(Default::default()),
            Err(e) => return Err(e),
        };
        self.write_updated(bucket, key, &mut value, updates, pretty).await?;
        Ok(value)
    }

    async fn write_updated(
        &self,
        bucket: &str,
        key: &str,
        value: &mut Value,
        updates: Vec<(String, Update)>,
        pretty: bool,
    ) -> Result<()> {
        jsonpath::apply_all(value, updates)?;
        self.put(bucket, key, value, pretty).await?;
        Ok(())
    }

    /// Delete a record and evict it from the cache
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        let result = self.transfer.delete(bucket, key).await;
        self.evict(bucket, key);
        result
    }

    /// Server-side copy; drops any cached record at the destination
    pub async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dest_bucket: &str,
        dest_key: &str,
        options: &PutOptions,
    ) -> Result<ObjectMeta> {
        let meta = self
            .transfer
            .copy(src_bucket, src_key, dest_bucket, dest_key, options)
            .await?;
        self.evict(dest_bucket, dest_key);
        Ok(meta)
    }

    /// Copy then [`delete`](Self::delete) the source
    ///
    /// Not atomic: when the delete fails both objects remain and the delete
    /// error is returned.
    pub async fn move_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dest_bucket: &str,
        dest_key: &str,
        options: &PutOptions,
    ) -> Result<ObjectMeta> {
        let meta = self
            .copy(src_bucket, src_key, dest_bucket, dest_key, options)
            .await?;
        self.delete(src_bucket, src_key).await?;
        Ok(meta)
    }

    fn evict(&self, bucket: &str, key: &str) {
        if let Some((cache, entry)) = self.cache_slot(bucket, key) {
            cache.delete(&entry);
        }
    }
}
