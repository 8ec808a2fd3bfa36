//! Multipart upload support
//!
//! Streams of unknown length are cut into parts and uploaded one part at a
//! time, so memory use is bounded by the part size. A stream shorter than
//! one part is sent with a single PUT instead.

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use tokio::io::AsyncReadExt;

use s3kv_core::{Error, ObjectMeta, ObjectReader, PutOptions, Result};

use crate::client::{S3Store, apply_put_options, map_sdk_error, now_seconds};

/// Default part size: 16 MiB
pub const DEFAULT_PART_SIZE: u64 = 16 * 1024 * 1024;

/// Minimum part size: 5 MiB (S3 requirement)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum part size: 5 GiB
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts: 10,000 (S3 limit)
pub const MAX_PARTS: u64 = 10_000;

/// Multipart upload configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartConfig {
    /// Part size in bytes
    pub part_size: u64,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
        }
    }
}

impl MultipartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part_size(mut self, size: u64) -> Self {
        self.part_size = size.clamp(MIN_PART_SIZE, MAX_PART_SIZE);
        self
    }

    /// Part size for a stream of `size_hint` bytes
    ///
    /// Grows the configured size when the stream would otherwise need more
    /// than [`MAX_PARTS`] parts. Unknown lengths use the configured size.
    pub fn calculate_part_size(&self, size_hint: Option<u64>) -> u64 {
        let Some(total) = size_hint else {
            return self.part_size;
        };
        if total.div_ceil(self.part_size) <= MAX_PARTS {
            self.part_size
        } else {
            total
                .div_ceil(MAX_PARTS)
                .clamp(MIN_PART_SIZE, MAX_PART_SIZE)
        }
    }
}

/// Read up to `size` bytes, fewer only at end of stream
async fn read_chunk(reader: &mut ObjectReader, size: u64) -> Result<Bytes> {
    let mut chunk = Vec::with_capacity(size as usize);
    (&mut *reader).take(size).read_to_end(&mut chunk).await?;
    Ok(Bytes::from(chunk))
}

impl S3Store {
    pub(crate) async fn upload_stream(
        &self,
        bucket: &str,
        key: &str,
        mut reader: ObjectReader,
        size_hint: Option<u64>,
        options: &PutOptions,
    ) -> Result<ObjectMeta> {
        let part_size = self.multipart.calculate_part_size(size_hint);
        let first = read_chunk(&mut reader, part_size).await?;
        if (first.len() as u64) < part_size {
            tracing::debug!(bucket, key, bytes = first.len(), "stream fits one part");
            return self.put_buffer(bucket, key, first, options).await;
        }

        let request = self.inner.create_multipart_upload().bucket(bucket).key(key);
        let created = apply_put_options!(request, options)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| Error::Store(format!("no upload id returned for {bucket}/{key}")))?
            .to_string();
        tracing::debug!(bucket, key, upload_id = %upload_id, part_size, "multipart upload started");

        match self
            .upload_parts(bucket, key, &upload_id, first, reader, part_size)
            .await
        {
            Ok(meta) => Ok(meta),
            Err(e) => {
                if let Err(abort) = self
                    .inner
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(bucket, key, upload_id = %upload_id, error = %map_sdk_error(abort, bucket, key), "abort failed");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        first: Bytes,
        mut reader: ObjectReader,
        part_size: u64,
    ) -> Result<ObjectMeta> {
        let mut parts = Vec::new();
        let mut total = 0u64;
        let mut chunk = first;

        while !chunk.is_empty() {
            let part_number = parts.len() as i32 + 1;
            total += chunk.len() as u64;
            let uploaded = self
                .inner
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| map_sdk_error(e, bucket, key))?;
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag)
                    .part_number(part_number)
                    .build(),
            );
            chunk = read_chunk(&mut reader, part_size).await?;
        }

        let completed = self
            .inner
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;
        tracing::debug!(bucket, key, bytes = total, "multipart upload complete");

        let mut meta = ObjectMeta::new(key, total, now_seconds());
        meta.etag = completed.e_tag().map(|etag| etag.trim_matches('"').to_string());
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_size_clamping() {
        let config = MultipartConfig::new().part_size(1024);
        assert_eq!(config.part_size, MIN_PART_SIZE);

        let config = MultipartConfig::new().part_size(10 * 1024 * 1024 * 1024);
        assert_eq!(config.part_size, MAX_PART_SIZE);
    }

    #[test]
    fn test_calculate_part_size() {
        let config = MultipartConfig::default();
        assert_eq!(config.calculate_part_size(None), DEFAULT_PART_SIZE);
        assert_eq!(config.calculate_part_size(Some(1024)), DEFAULT_PART_SIZE);

        let huge = DEFAULT_PART_SIZE * 20_000;
        let size = config.calculate_part_size(Some(huge));
        assert!(huge.div_ceil(size) <= MAX_PARTS);
    }

    #[tokio::test]
    async fn test_read_chunk_stops_at_size() {
        let mut reader: ObjectReader = Box::pin(&b"abcdefghij"[..]);
        assert_eq!(&read_chunk(&mut reader, 4).await.unwrap()[..], b"abcd");
        assert_eq!(&read_chunk(&mut reader, 4).await.unwrap()[..], b"efgh");
        assert_eq!(&read_chunk(&mut reader, 4).await.unwrap()[..], b"ij");
        assert!(read_chunk(&mut reader, 4).await.unwrap().is_empty());
    }
}
