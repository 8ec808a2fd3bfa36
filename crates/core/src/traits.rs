//! ObjectStore trait definition
//!
//! This trait defines the narrow interface the engine needs from an
//! S3-compatible store. The aws-sdk-s3 adapter lives in `s3kv-s3`; the
//! in-memory implementation in [`crate::memory`] backs the tests.

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::Result;

/// Readable byte stream of an object body
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// One entry of a listing, snapshotted at listing time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    /// Object key
    pub key: String,

    /// Size in bytes
    pub size: u64,

    /// Last modified time (epoch seconds)
    pub mtime: i64,
}

impl ObjectDescriptor {
    pub fn new(key: impl Into<String>, size: u64, mtime: i64) -> Self {
        Self {
            key: key.into(),
            size,
            mtime,
        }
    }

    /// Final path component of the key
    pub fn basename(&self) -> &str {
        self.key
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.key)
    }
}

/// Materialized result of a filtered listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListingResult {
    /// Matching objects in key order
    pub files: Vec<ObjectDescriptor>,

    /// Sum of the sizes of `files`
    pub total_bytes: u64,
}

impl ListingResult {
    pub fn push(&mut self, item: ObjectDescriptor) {
        self.total_bytes += item.size;
        self.files.push(item);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Object metadata as returned by head, put and copy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object key
    pub key: String,

    /// Size in bytes
    pub size: u64,

    /// Last modified time (epoch seconds)
    pub mtime: i64,

    /// ETag (usually MD5 for single-part uploads)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Content type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Storage class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

impl ObjectMeta {
    pub fn new(key: impl Into<String>, size: u64, mtime: i64) -> Self {
        Self {
            key: key.into(),
            size,
            mtime,
            ..Default::default()
        }
    }
}

/// A bucket visible to the configured credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketInfo {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<jiff::Timestamp>,
}

/// One page request for [`ObjectStore::list_objects`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Only keys starting with this prefix
    pub prefix: String,

    /// Maximum number of entries (keys plus common prefixes) per page
    pub max_keys: i32,

    /// Only keys strictly after this one
    pub start_after: Option<String>,

    /// Group keys sharing a prefix up to this delimiter
    pub delimiter: Option<String>,
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects on this page
    pub entries: Vec<ObjectDescriptor>,

    /// Grouped prefixes (only when a delimiter was requested)
    pub common_prefixes: Vec<String>,

    /// Whether more pages remain
    pub is_truncated: bool,
}

/// Body of an object GET
pub struct GetOutput {
    /// Metadata from the response headers
    pub meta: ObjectMeta,

    /// Open body stream, not yet read
    pub body: ObjectReader,
}

impl fmt::Debug for GetOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetOutput")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Payload of an object PUT
pub enum Body {
    /// Fully buffered payload
    Bytes(Bytes),

    /// Streamed payload of possibly unknown length, uploaded in parts
    Stream {
        reader: ObjectReader,
        size_hint: Option<u64>,
    },
}

impl Body {
    /// Wrap any async reader as a streamed body
    pub fn from_reader(reader: impl AsyncRead + Send + 'static, size_hint: Option<u64>) -> Self {
        Body::Stream {
            reader: Box::pin(reader),
            size_hint,
        }
    }

    /// Known length of the body, if any
    pub fn size_hint(&self) -> Option<u64> {
        match self {
            Body::Bytes(data) => Some(data.len() as u64),
            Body::Stream { size_hint, .. } => *size_hint,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            Body::Stream { size_hint, .. } => f
                .debug_struct("Stream")
                .field("size_hint", size_hint)
                .finish_non_exhaustive(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(data: Bytes) -> Self {
        Body::Bytes(data)
    }
}

impl From<Vec<u8>> for Body {
    fn from(data: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(data))
    }
}

/// Destination metadata for put and copy
///
/// A server-side copy never inherits ACL or storage class from the source;
/// whatever is wanted on the destination has to be set here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Content type
    pub content_type: Option<String>,

    /// Storage class (e.g. "STANDARD_IA")
    pub storage_class: Option<String>,

    /// Canned ACL (e.g. "public-read")
    pub acl: Option<String>,

    /// User metadata
    pub metadata: BTreeMap<String, String>,
}

impl PutOptions {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Whether any destination metadata was requested
    pub fn replaces_metadata(&self) -> bool {
        self.content_type.is_some() || !self.metadata.is_empty()
    }
}

/// Trait for S3-compatible storage operations
///
/// Every implementation must report a missing key as
/// [`crate::Error::NotFound`], never as a generic store failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List buckets
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    /// Fetch one page of a listing
    async fn list_objects(&self, bucket: &str, request: &ListRequest) -> Result<ListPage>;

    /// Get object metadata
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta>;

    /// Start reading an object; the body is returned unread
    async fn get_object(&self, bucket: &str, key: &str) -> Result<GetOutput>;

    /// Write an object, using multipart upload for streamed bodies
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Body,
        options: &PutOptions,
    ) -> Result<ObjectMeta>;

    /// Server-side copy
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dest_bucket: &str,
        dest_key: &str,
        options: &PutOptions,
    ) -> Result<ObjectMeta>;

    /// Delete an object; succeeds silently when the key is missing
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_basename() {
        assert_eq!(ObjectDescriptor::new("a/b/c.txt", 1, 0).basename(), "c.txt");
        assert_eq!(ObjectDescriptor::new("c.txt", 1, 0).basename(), "c.txt");
        assert_eq!(ObjectDescriptor::new("a/dir/", 0, 0).basename(), "dir");
    }

    #[test]
    fn test_listing_result_push() {
        let mut listing = ListingResult::default();
        listing.push(ObjectDescriptor::new("a", 10, 0));
        listing.push(ObjectDescriptor::new("b", 5, 0));
        assert_eq!(listing.len(), 2);
        assert_eq!(listing.total_bytes, 15);
    }

    #[test]
    fn test_body_size_hint() {
        assert_eq!(Body::from(vec![0u8; 12]).size_hint(), Some(12));
        let body = Body::from_reader(tokio::io::empty(), None);
        assert_eq!(body.size_hint(), None);
    }

    #[test]
    fn test_put_options_replaces_metadata() {
        assert!(!PutOptions::default().replaces_metadata());
        assert!(
            PutOptions::default()
                .with_content_type("application/json")
                .replaces_metadata()
        );
    }
}
