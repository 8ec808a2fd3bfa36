//! High-level client
//!
//! [`Client`] binds a store handle to one bucket and wires the lister,
//! transfer primitive, record codec and cache together. It is cheap to
//! clone; [`Client::with_bucket`] shares everything but the bucket name.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cache::ReadCache;
use crate::codec::{JsonCodec, Record};
use crate::error::{Error, Result};
use crate::instrumented::InstrumentedStore;
use crate::jsonpath::Update;
use crate::lister::{FolderListing, ListSpec, Lister, Pager};
use crate::path::KeyPrefix;
use crate::perf::PerfTracker;
use crate::progress::DEFAULT_PROGRESS_INTERVAL;
use crate::traits::{BucketInfo, GetOutput, ListingResult, ObjectDescriptor, ObjectMeta, ObjectReader, ObjectStore, PutOptions};
use crate::transfer::{GetOptions, Transfer, UploadOptions, is_gzip_key};

/// A line matched by [`Client::grep`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrepMatch {
    pub key: String,
    /// 1-based
    pub line_number: u64,
    pub line: String,
}

/// Builder for [`Client`]
pub struct ClientBuilder {
    store: Arc<dyn ObjectStore>,
    bucket: Option<String>,
    key_prefix: KeyPrefix,
    cache: Option<Arc<ReadCache>>,
    perf: Option<Arc<dyn PerfTracker>>,
    concurrency: usize,
    progress_interval: Duration,
}

impl ClientBuilder {
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Prefix prepended to every key
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = KeyPrefix::new(prefix);
        self
    }

    pub fn cache(mut self, cache: Arc<ReadCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Report every store call to `tracker`
    pub fn perf(mut self, tracker: Arc<dyn PerfTracker>) -> Self {
        self.perf = Some(tracker);
        self
    }

    /// Default number of transfers in flight for multi-object operations
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn build(self) -> Result<Client> {
        let bucket = self
            .bucket
            .filter(|b| !b.is_empty())
            .ok_or_else(|| Error::InvalidArgument("no bucket configured".into()))?;

        let store: Arc<dyn ObjectStore> = match self.perf {
            Some(tracker) => Arc::new(InstrumentedStore::new(self.store, tracker)),
            None => self.store,
        };
        let transfer = Transfer::new(store.clone(), self.key_prefix.clone())
            .with_progress_interval(self.progress_interval);

        Ok(Client {
            lister: Lister::new(store.clone(), self.key_prefix),
            codec: JsonCodec::new(transfer.clone(), self.cache),
            transfer,
            store,
            bucket,
            concurrency: self.concurrency,
            progress_interval: self.progress_interval,
        })
    }
}

/// Object store as a key/value store and bulk transfer tool
#[derive(Clone)]
pub struct Client {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) bucket: String,
    pub(crate) transfer: Transfer,
    pub(crate) lister: Lister,
    pub(crate) codec: JsonCodec,
    pub(crate) concurrency: usize,
    pub(crate) progress_interval: Duration,
}

impl Client {
    pub fn builder(store: Arc<dyn ObjectStore>) -> ClientBuilder {
        ClientBuilder {
            store,
            bucket: None,
            key_prefix: KeyPrefix::default(),
            cache: None,
            perf: None,
            concurrency: 1,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Same store, cache and settings, another bucket
    pub fn with_bucket(&self, bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..self.clone()
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn transfer(&self) -> &Transfer {
        &self.transfer
    }

    /// Record access, also used for copies and moves so cached records stay
    /// consistent with the store
    pub fn codec(&self) -> &JsonCodec {
        &self.codec
    }

    pub fn lister(&self) -> &Lister {
        &self.lister
    }

    pub fn cache(&self) -> Option<&Arc<ReadCache>> {
        self.codec.cache()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    // Records

    pub async fn get(&self, key: &str) -> Result<Record> {
        self.codec.get(&self.bucket, key).await
    }

    pub async fn get_path(&self, key: &str, path: &str) -> Result<Option<Value>> {
        self.codec.get_path(&self.bucket, key, path).await
    }

    pub async fn put(&self, key: &str, value: &Value, pretty: bool) -> Result<ObjectMeta> {
        self.codec.put(&self.bucket, key, value, pretty).await
    }

    pub async fn update(&self, key: &str, updates: Vec<(String, Update)>, pretty: bool) -> Result<Value> {
        self.codec.update(&self.bucket, key, updates, pretty).await
    }

    pub async fn update_or_create(&self, key: &str, updates: Vec<(String, Update)>, pretty: bool) -> Result<Value> {
        self.codec
            .update_or_create(&self.bucket, key, updates, pretty)
            .await
    }

    /// Delete one object, evicting it from the cache
    pub async fn delete(&self, key: &str) -> Result<ObjectMeta> {
        self.codec.delete(&self.bucket, key).await
    }

    // Single objects

    pub async fn head(&self, key: &str, nonfatal: bool) -> Result<Option<ObjectMeta>> {
        self.transfer.head(&self.bucket, key, nonfatal).await
    }

    pub async fn get_stream(&self, key: &str, options: &GetOptions) -> Result<GetOutput> {
        self.transfer.get_stream(&self.bucket, key, options).await
    }

    pub async fn get_bytes(&self, key: &str, options: &GetOptions) -> Result<Bytes> {
        let (_, data) = self.transfer.get_bytes(&self.bucket, key, options).await?;
        Ok(data)
    }

    pub async fn put_stream(
        &self,
        key: &str,
        reader: ObjectReader,
        size_hint: Option<u64>,
        options: &UploadOptions,
    ) -> Result<ObjectMeta> {
        self.transfer
            .put_stream(&self.bucket, key, reader, size_hint, options)
            .await
    }

    pub async fn put_bytes(&self, key: &str, data: Bytes, options: &UploadOptions) -> Result<ObjectMeta> {
        self.transfer.put_bytes(&self.bucket, key, data, options).await
    }

    /// Server-side copy within the bucket
    pub async fn copy(&self, src_key: &str, dest_key: &str, options: &PutOptions) -> Result<ObjectMeta> {
        self.codec
            .copy(&self.bucket, src_key, &self.bucket, dest_key, options)
            .await
    }

    /// Copy then delete within the bucket; not atomic
    pub async fn move_object(&self, src_key: &str, dest_key: &str, options: &PutOptions) -> Result<ObjectMeta> {
        self.codec
            .move_object(&self.bucket, src_key, &self.bucket, dest_key, options)
            .await
    }

    // Listing

    pub async fn list(&self, prefix: &str, spec: &ListSpec) -> Result<ListingResult> {
        self.lister.list(&self.bucket, prefix, spec).await
    }

    pub async fn walk<F>(&self, prefix: &str, spec: &ListSpec, visit: F) -> Result<()>
    where
        F: FnMut(&ObjectDescriptor) -> ControlFlow<()>,
    {
        self.lister.walk(&self.bucket, prefix, spec, visit).await
    }

    pub fn pager(&self, prefix: &str, spec: &ListSpec) -> Pager {
        self.lister.pager(&self.bucket, prefix, spec)
    }

    pub async fn list_folders(&self, prefix: &str) -> Result<FolderListing> {
        self.lister.list_folders(&self.bucket, prefix).await
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.store
            .list_buckets()
            .await
            .inspect_err(|e| e.log("err_list", ""))
    }

    /// Report lines matching `pattern` in every object under `prefix`
    ///
    /// Objects are read line by line; keys ending in `.gz` are gunzipped.
    /// Bytes that are not UTF-8 are replaced before matching, so binary
    /// objects never abort the search. Stops after `max_matches` matches
    /// when given (0 reports nothing), or when `on_match` returns `Break`.
    /// Returns the number of matches reported.
    pub async fn grep<F>(
        &self,
        prefix: &str,
        spec: &ListSpec,
        pattern: &Regex,
        max_matches: Option<u64>,
        mut on_match: F,
    ) -> Result<u64>
    where
        F: FnMut(GrepMatch) -> ControlFlow<()>,
    {
        if max_matches == Some(0) {
            return Ok(0);
        }
        let mut pager = self.pager(prefix, spec);
        let mut matches = 0u64;

        while let Some(page) = pager.next_page().await? {
            for item in page {
                let options = GetOptions {
                    decompress: is_gzip_key(&item.key),
                    progress: None,
                };
                let output = self.get_stream(&item.key, &options).await?;
                let mut reader = BufReader::new(output.body);
                let mut buf = Vec::new();
                let mut line_number = 0u64;

                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf).await {
                        Ok(0) => break,
                        Ok(_) => {}
                        Err(e) if options.decompress => {
                            let err = Error::Compression(format!("{}: {e}", item.key));
                            err.log("err_gzip", &item.key);
                            return Err(err);
                        }
                        Err(e) => {
                            let err = Error::Io(e);
                            err.log("err_get", &item.key);
                            return Err(err);
                        }
                    }
                    line_number += 1;
                    let line = String::from_utf8_lossy(trim_line_end(&buf));
                    if !pattern.is_match(&line) {
                        continue;
                    }

                    matches += 1;
                    let found = GrepMatch {
                        key: item.key.clone(),
                        line_number,
                        line: line.into_owned(),
                    };
                    if on_match(found).is_break() || max_matches.is_some_and(|max| matches >= max) {
                        return Ok(matches);
                    }
                }
            }
        }
        Ok(matches)
    }
}

/// Strip a trailing `\n` or `\r\n`
fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
