//! Path parsing and key prefixes
//!
//! Handles parsing of remote locations in the format `s3://bucket[/key]`.
//! Anything else is treated as a local path and passed through as-is.

use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};

const SCHEME: &str = "s3://";

/// A parsed remote location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Url {
    /// Bucket name
    pub bucket: String,
    /// Object key or key prefix (empty for bucket root)
    pub key: String,
}

impl S3Url {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Whether the key has directory semantics
    pub fn is_dir(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }

    /// Key as a listing prefix (trailing slash added unless empty)
    pub fn dir_prefix(&self) -> String {
        if self.is_dir() {
            self.key.clone()
        } else {
            format!("{}/", self.key)
        }
    }

    /// Join a relative child path onto this location
    pub fn join(&self, child: &str) -> Self {
        Self {
            bucket: self.bucket.clone(),
            key: join_key(&self.key, child),
        }
    }
}

impl fmt::Display for S3Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}/{}", self.bucket, self.key)
    }
}

/// Parsed location that can be either local or remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Local filesystem path
    Local(PathBuf),
    /// Remote object or prefix
    Remote(S3Url),
}

/// Parse a location string
///
/// `s3://bucket`, `s3://bucket/` and `s3://bucket/some/key` are remote;
/// every other non-empty string is a local path.
pub fn parse_location(input: &str) -> Result<Location> {
    if input.is_empty() {
        return Err(Error::InvalidPath("Path cannot be empty".into()));
    }

    let Some(rest) = input.strip_prefix(SCHEME) else {
        return Ok(Location::Local(PathBuf::from(input)));
    };

    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(Error::InvalidPath(format!(
            "'{input}' has no bucket. Use format: s3://bucket[/key]"
        )));
    }
    if !is_valid_bucket_name(bucket) {
        return Err(Error::InvalidPath(format!("Invalid bucket name: {bucket}")));
    }

    Ok(Location::Remote(S3Url::new(bucket, key)))
}

/// Parse a location that must be remote
pub fn parse_remote(input: &str) -> Result<S3Url> {
    match parse_location(input)? {
        Location::Remote(url) => Ok(url),
        Location::Local(_) => Err(Error::InvalidPath(format!(
            "'{input}' is not a remote location. Use format: s3://bucket[/key]"
        ))),
    }
}

fn is_valid_bucket_name(name: &str) -> bool {
    (3..=63).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
}

/// Join a key prefix and a relative key with exactly one `/` between them
pub fn join_key(prefix: &str, rel: &str) -> String {
    let rel = rel.trim_start_matches('/');
    if prefix.is_empty() {
        rel.to_string()
    } else if prefix.ends_with('/') {
        format!("{prefix}{rel}")
    } else {
        format!("{prefix}/{rel}")
    }
}

/// Constant prefix prepended to every key sent to the store
///
/// Keys handed back to the caller have it stripped again, so the prefix
/// is invisible above the transfer layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPrefix(String);

impl KeyPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key as seen by the store
    pub fn apply(&self, key: &str) -> String {
        format!("{}{key}", self.0)
    }

    /// Key as seen by the caller
    pub fn strip<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.0.as_str()).unwrap_or(key)
    }
}
