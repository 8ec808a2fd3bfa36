//! Single-object transfer primitive
//!
//! One logical get/put/head/copy/move/delete against one key, with optional
//! inline gzip and throttled byte progress. Keys passed in are relative to
//! the configured [`KeyPrefix`]; keys handed back have it stripped.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_compression::Level;
use async_compression::tokio::bufread::{GzipDecoder, GzipEncoder};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use crate::error::{Error, Result};
use crate::local;
use crate::path::KeyPrefix;
use crate::progress::{DEFAULT_PROGRESS_INTERVAL, ProgressFn, ProgressReader, ProgressState};
use crate::traits::{Body, GetOutput, ObjectMeta, ObjectReader, ObjectStore, PutOptions};

/// Gzip compression level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    /// Encoder default
    #[default]
    Default,
    /// Explicit level, 0 (store) to 9 (best)
    Level(i32),
}

impl Compression {
    fn level(self) -> Level {
        match self {
            Compression::Default => Level::Default,
            Compression::Level(level) => Level::Precise(level.clamp(0, 9)),
        }
    }
}

/// Whether a key names a gzip stream
pub fn is_gzip_key(key: &str) -> bool {
    key.ends_with(".gz")
}

/// Options for reads
#[derive(Clone, Default)]
pub struct GetOptions {
    /// Gunzip the body while reading
    pub decompress: bool,
    pub progress: Option<ProgressFn>,
}

/// Options for writes
#[derive(Clone, Default)]
pub struct UploadOptions {
    /// Destination metadata
    pub put: PutOptions,
    /// Gzip the body while uploading
    pub compress: Option<Compression>,
    pub progress: Option<ProgressFn>,
}

/// Transfer primitive bound to one store
#[derive(Clone)]
pub struct Transfer {
    store: Arc<dyn ObjectStore>,
    key_prefix: KeyPrefix,
    progress_interval: Duration,
}

impl Transfer {
    pub fn new(store: Arc<dyn ObjectStore>, key_prefix: KeyPrefix) -> Self {
        Self {
            store,
            key_prefix,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Minimum spacing between two progress callbacks
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn key_prefix(&self) -> &KeyPrefix {
        &self.key_prefix
    }

    fn caller_meta(&self, mut meta: ObjectMeta) -> ObjectMeta {
        meta.key = self.key_prefix.strip(&meta.key).to_string();
        meta
    }

    fn with_progress(&self, reader: ObjectReader, total: Option<u64>, progress: &Option<ProgressFn>) -> ObjectReader {
        match progress {
            Some(callback) => Box::pin(ProgressReader::new(
                reader,
                total,
                callback.clone(),
                self.progress_interval,
            )),
            None => reader,
        }
    }

    /// Open an object for reading; the body is not read here
    pub async fn get_stream(&self, bucket: &str, key: &str, options: &GetOptions) -> Result<GetOutput> {
        let full_key = self.key_prefix.apply(key);
        tracing::debug!(bucket, key = %full_key, decompress = options.decompress, "get");

        let output = self
            .store
            .get_object(bucket, &full_key)
            .await
            .inspect_err(|e| e.log("err_get", &full_key))?;

        let (body, total) = if options.decompress {
            let mut decoder = GzipDecoder::new(BufReader::new(output.body));
            decoder.multiple_members(true);
            (Box::pin(decoder) as ObjectReader, None)
        } else {
            (output.body, Some(output.meta.size))
        };

        Ok(GetOutput {
            meta: self.caller_meta(output.meta),
            body: self.with_progress(body, total, &options.progress),
        })
    }

    /// Read a whole object into memory
    pub async fn get_bytes(&self, bucket: &str, key: &str, options: &GetOptions) -> Result<(ObjectMeta, Bytes)> {
        let mut output = self.get_stream(bucket, key, options).await?;
        let mut data = Vec::with_capacity(output.meta.size as usize);
        output
            .body
            .read_to_end(&mut data)
            .await
            .map_err(|e| read_error(e, options.decompress, key))?;
        Ok((output.meta, Bytes::from(data)))
    }

    /// Upload a stream of unknown or known length
    ///
    /// `size_hint` is the length of the uncompressed input, if known.
    pub async fn put_stream(
        &self,
        bucket: &str,
        key: &str,
        reader: ObjectReader,
        size_hint: Option<u64>,
        options: &UploadOptions,
    ) -> Result<ObjectMeta> {
        let full_key = self.key_prefix.apply(key);
        tracing::debug!(bucket, key = %full_key, ?size_hint, compress = options.compress.is_some(), "put stream");

        let body = match options.compress {
            Some(compression) => {
                let reader = self.with_progress(reader, None, &options.progress);
                Body::from_reader(
                    GzipEncoder::with_quality(BufReader::new(reader), compression.level()),
                    None,
                )
            }
            None => Body::Stream {
                reader: self.with_progress(reader, size_hint, &options.progress),
                size_hint,
            },
        };

        let meta = self
            .store
            .put_object(bucket, &full_key, body, &options.put)
            .await
            .inspect_err(|e| e.log("err_put", &full_key))?;
        Ok(self.caller_meta(meta))
    }

    /// Upload an in-memory buffer
    pub async fn put_bytes(&self, bucket: &str, key: &str, data: Bytes, options: &UploadOptions) -> Result<ObjectMeta> {
        let full_key = self.key_prefix.apply(key);
        let loaded = data.len() as u64;

        let (data, total) = match options.compress {
            Some(compression) => (gzip(&data, compression).await?, None),
            None => (data, Some(loaded)),
        };
        tracing::debug!(bucket, key = %full_key, bytes = data.len(), "put");

        let meta = self
            .store
            .put_object(bucket, &full_key, Body::Bytes(data), &options.put)
            .await
            .inspect_err(|e| e.log("err_put", &full_key))?;

        if let Some(callback) = &options.progress {
            callback(ProgressState { loaded, total });
        }
        Ok(self.caller_meta(meta))
    }

    /// Object metadata; a missing key yields `Ok(None)` when `nonfatal`
    pub async fn head(&self, bucket: &str, key: &str, nonfatal: bool) -> Result<Option<ObjectMeta>> {
        let full_key = self.key_prefix.apply(key);
        match self.store.head_object(bucket, &full_key).await {
            Ok(meta) => Ok(Some(self.caller_meta(meta))),
            Err(e) if nonfatal && e.is_not_found() => {
                tracing::debug!(bucket, key = %full_key, "head: not found");
                Ok(None)
            }
            Err(e) => {
                e.log("err_head", &full_key);
                Err(e)
            }
        }
    }

    /// Object metadata; a missing key is [`Error::NotFound`]
    pub async fn stat(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        self.head(bucket, key, false)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{bucket}/{key}")))
    }

    /// Server-side copy
    ///
    /// The destination gets only the metadata in `options`; ACL and storage
    /// class of the source are not carried over.
    pub async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dest_bucket: &str,
        dest_key: &str,
        options: &PutOptions,
    ) -> Result<ObjectMeta> {
        let src = self.key_prefix.apply(src_key);
        let dest = self.key_prefix.apply(dest_key);
        tracing::debug!(src_bucket, src = %src, dest_bucket, dest = %dest, "copy");

        let meta = self
            .store
            .copy_object(src_bucket, &src, dest_bucket, &dest, options)
            .await
            .inspect_err(|e| e.log("err_copy", &src))?;
        Ok(self.caller_meta(meta))
    }

    /// Delete an object, returning its last metadata
    ///
    /// The store reports success for missing keys, so a head request runs
    /// first to turn that into [`Error::NotFound`].
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        let meta = self.stat(bucket, key).await?;
        let full_key = self.key_prefix.apply(key);
        tracing::debug!(bucket, key = %full_key, "delete");

        self.store
            .delete_object(bucket, &full_key)
            .await
            .inspect_err(|e| e.log("err_delete", &full_key))?;
        Ok(meta)
    }

    /// Stream a local file to `key`
    pub async fn upload_file(&self, path: &Path, bucket: &str, key: &str, options: &UploadOptions) -> Result<ObjectMeta> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| Error::local_fs(path, e))
            .inspect_err(|e| e.log("err_fs", &path.display().to_string()))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| Error::local_fs(path, e))?
            .len();

        let mut options = options.clone();
        if options.put.content_type.is_none() {
            options.put.content_type = mime_guess::from_path(path)
                .first()
                .map(|mime| mime.essence_str().to_string());
        }

        self.put_stream(bucket, key, Box::pin(file), Some(size), &options)
            .await
    }

    /// Stream `key` into a local file, creating parent directories
    ///
    /// Returns the number of bytes written.
    pub async fn download_file(&self, bucket: &str, key: &str, path: &Path, options: &GetOptions) -> Result<u64> {
        let mut output = self.get_stream(bucket, key, options).await?;

        local::ensure_parent(path)
            .await
            .inspect_err(|e| e.log("err_fs", &path.display().to_string()))?;
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| Error::local_fs(path, e))
            .inspect_err(|e| e.log("err_fs", &path.display().to_string()))?;

        let written = tokio::io::copy(&mut output.body, &mut file)
            .await
            .map_err(|e| match read_error(e, options.decompress, key) {
                Error::Io(e) => Error::local_fs(path, e),
                other => other,
            })?;
        file.flush().await.map_err(|e| Error::local_fs(path, e))?;

        tracing::debug!(bucket, key, path = %path.display(), bytes = written, "downloaded");
        Ok(written)
    }
}

/// Gzip a buffer in memory
pub async fn gzip(data: &[u8], compression: Compression) -> Result<Bytes> {
    let mut encoder = GzipEncoder::with_quality(data, compression.level());
    let mut out = Vec::new();
    encoder
        .read_to_end(&mut out)
        .await
        .map_err(|e| Error::Compression(e.to_string()))
        .inspect_err(|e| e.log("err_gzip", ""))?;
    Ok(Bytes::from(out))
}

fn read_error(err: std::io::Error, decompress: bool, key: &str) -> Error {
    if decompress && err.kind() == std::io::ErrorKind::InvalidData {
        let err = Error::Compression(format!("{key}: {err}"));
        err.log("err_gzip", key);
        err
    } else {
        let err = Error::Io(err);
        err.log("err_get", key);
        err
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::memory::MemoryStore;
    use crate::perf::OpKind;
    use crate::traits::MockObjectStore;

    fn setup(prefix: &str) -> (Arc<MemoryStore>, Transfer) {
        let memory = Arc::new(MemoryStore::new().with_bucket("b"));
        let transfer = Transfer::new(memory.clone(), KeyPrefix::new(prefix));
        (memory, transfer)
    }

    #[tokio::test]
    async fn test_put_get_bytes_with_prefix() {
        let (memory, transfer) = setup("app/");
        let meta = transfer
            .put_bytes("b", "k.txt", Bytes::from_static(b"hello"), &UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(meta.key, "k.txt");
        assert!(memory.contains("b", "app/k.txt"));

        let (meta, data) = transfer.get_bytes("b", "k.txt", &GetOptions::default()).await.unwrap();
        assert_eq!(meta.key, "k.txt");
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn test_gzip_upload_then_decompressed_read() {
        let (memory, transfer) = setup("");
        let text = "line\n".repeat(1_000);
        let upload = UploadOptions {
            compress: Some(Compression::Level(6)),
            ..Default::default()
        };
        transfer
            .put_stream("b", "log.gz", Box::pin(std::io::Cursor::new(text.clone().into_bytes())), None, &upload)
            .await
            .unwrap();
        let stored = memory.data("b", "log.gz").unwrap();
        assert!(stored.len() < text.len());
        assert_eq!(&stored[..2], &[0x1f, 0x8b]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let get = GetOptions {
            decompress: true,
            progress: Some(Arc::new(move |s: ProgressState| sink.lock().unwrap().push(s))),
        };
        let (_, data) = transfer.get_bytes("b", "log.gz", &get).await.unwrap();
        assert_eq!(data, Bytes::from(text.clone()));

        let last = *seen.lock().unwrap().last().unwrap();
        assert_eq!(last.total, None);
        assert_eq!(last.loaded, text.len() as u64);
    }

    #[tokio::test]
    async fn test_decompress_garbage_is_compression_error() {
        let (memory, transfer) = setup("");
        memory.insert("b", "bad.gz", "not gzip at all").unwrap();
        let get = GetOptions {
            decompress: true,
            progress: None,
        };
        let err = transfer.get_bytes("b", "bad.gz", &get).await.unwrap_err();
        assert!(matches!(err, Error::Compression(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_head_nonfatal() {
        let (_, transfer) = setup("");
        assert_eq!(transfer.head("b", "missing", true).await.unwrap(), None);
        assert!(transfer.head("b", "missing", false).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_never_calls_delete() {
        let mut store = MockObjectStore::new();
        store
            .expect_head_object()
            .times(1)
            .returning(|bucket, key| Err(Error::NotFound(format!("{bucket}/{key}"))));
        store.expect_delete_object().never();

        let transfer = Transfer::new(Arc::new(store), KeyPrefix::default());
        let err = transfer.delete("b", "gone").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_returns_last_meta() {
        let (memory, transfer) = setup("");
        memory.insert("b", "k", "12345").unwrap();
        let meta = transfer.delete("b", "k").await.unwrap();
        assert_eq!(meta.size, 5);
        assert!(!memory.contains("b", "k"));
        assert_eq!(memory.calls(OpKind::Head), 1);
        assert_eq!(memory.calls(OpKind::Delete), 1);
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let (memory, transfer) = setup("");
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("data.json");
        std::fs::write(&src, br#"{"a":1}"#).unwrap();

        let meta = transfer
            .upload_file(&src, "b", "remote/data.json", &UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(meta.size, 7);
        assert_eq!(meta.content_type.as_deref(), Some("application/json"));
        assert!(memory.contains("b", "remote/data.json"));

        let dest = dir.path().join("nested/out/data.json");
        let written = transfer
            .download_file("b", "remote/data.json", &dest, &GetOptions::default())
            .await
            .unwrap();
        assert_eq!(written, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), br#"{"a":1}"#);
    }
}
