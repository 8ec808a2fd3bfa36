//! S3 store implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from s3kv-core.
//! Retries and timeouts are configured once on the SDK client; callers
//! never see individual attempts.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::MetadataDirective;
use aws_smithy_types::DateTime;
use bytes::Bytes;

use s3kv_core::{
    Body, BucketInfo, Error, GetOutput, ListPage, ListRequest, ObjectDescriptor, ObjectMeta, ObjectStore, Profile,
    PutOptions, Result,
};

use crate::multipart::MultipartConfig;

/// Apply destination metadata to any put-like request builder
macro_rules! apply_put_options {
    ($request:expr, $options:expr) => {{
        let options: &s3kv_core::PutOptions = $options;
        let mut request = $request;
        if let Some(content_type) = &options.content_type {
            request = request.content_type(content_type);
        }
        if let Some(class) = &options.storage_class {
            request = request.storage_class(aws_sdk_s3::types::StorageClass::from(class.as_str()));
        }
        if let Some(acl) = &options.acl {
            request = request.acl(aws_sdk_s3::types::ObjectCannedAcl::from(acl.as_str()));
        }
        if !options.metadata.is_empty() {
            request = request.set_metadata(Some(options.metadata.clone().into_iter().collect()));
        }
        request
    }};
}
pub(crate) use apply_put_options;

const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NoSuchBucket", "NotFound"];
const AUTH_CODES: &[&str] = &[
    "AccessDenied",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
];

/// Translate an SDK failure into the store error taxonomy
pub(crate) fn map_sdk_error<E>(err: SdkError<E, HttpResponse>, bucket: &str, key: &str) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    if matches!(err, SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)) {
        return Error::Network(message);
    }

    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code();
    if status == Some(404) || code.is_some_and(|c| NOT_FOUND_CODES.contains(&c)) {
        Error::NotFound(format!("{bucket}/{key}"))
    } else if matches!(status, Some(401 | 403)) || code.is_some_and(|c| AUTH_CODES.contains(&c)) {
        Error::Auth(message)
    } else {
        Error::Store(message)
    }
}

fn epoch_seconds(time: Option<&DateTime>) -> i64 {
    time.map(DateTime::secs).unwrap_or(0)
}

pub(crate) fn now_seconds() -> i64 {
    jiff::Timestamp::now().as_second()
}

fn trim_etag(etag: Option<&str>) -> Option<String> {
    etag.map(|e| e.trim_matches('"').to_string())
}

/// `bucket/key` for the copy-source header, key percent-encoded
fn copy_source(bucket: &str, key: &str) -> String {
    let key = urlencoding::encode(key).replace("%2F", "/");
    format!("{bucket}/{key}")
}

/// aws-sdk-s3 backed [`ObjectStore`]
///
/// Holds one SDK client and its connection pool; share it through an
/// `Arc<dyn ObjectStore>`.
pub struct S3Store {
    pub(crate) inner: aws_sdk_s3::Client,
    pub(crate) multipart: MultipartConfig,
}

impl S3Store {
    /// Create a store from a profile
    pub async fn new(profile: &Profile) -> Result<Self> {
        profile.validate()?;
        let retry = profile.retry_config();
        let timeout = profile.timeout_config();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(profile.region.clone()))
            .retry_config(
                RetryConfig::standard()
                    .with_max_attempts(retry.max_attempts.max(1))
                    .with_initial_backoff(Duration::from_millis(retry.initial_backoff_ms))
                    .with_max_backoff(Duration::from_millis(retry.max_backoff_ms)),
            )
            .timeout_config(
                TimeoutConfig::builder()
                    .connect_timeout(Duration::from_millis(timeout.connect_ms))
                    .read_timeout(Duration::from_millis(timeout.read_ms))
                    .build(),
            );

        if let Some(endpoint) = &profile.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        // Without static keys the default credential chain applies
        if let (Some(access_key), Some(secret_key)) = (&profile.access_key, &profile.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "s3kv-profile",
            ));
        }

        let config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(profile.path_style)
            .build();
        tracing::debug!(profile = %profile.name, endpoint = ?profile.endpoint, "store client created");

        Ok(Self::from_client(aws_sdk_s3::Client::from_conf(s3_config)))
    }

    /// Wrap an already configured SDK client
    pub fn from_client(inner: aws_sdk_s3::Client) -> Self {
        Self {
            inner,
            multipart: MultipartConfig::default(),
        }
    }

    pub fn with_multipart(mut self, multipart: MultipartConfig) -> Self {
        self.multipart = multipart;
        self
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    pub(crate) async fn put_buffer(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> Result<ObjectMeta> {
        let size = data.len() as u64;
        let request = self
            .inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data));
        let response = apply_put_options!(request, options)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;

        let mut meta = ObjectMeta::new(key, size, now_seconds());
        meta.etag = trim_etag(response.e_tag());
        meta.content_type = options.content_type.clone();
        Ok(meta)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let response = self
            .inner
            .list_buckets()
            .send()
            .await
            .map_err(|e| map_sdk_error(e, "", ""))?;

        Ok(response
            .buckets()
            .iter()
            .map(|b| BucketInfo {
                name: b.name().unwrap_or_default().to_string(),
                created: b
                    .creation_date()
                    .and_then(|d| jiff::Timestamp::from_second(d.secs()).ok()),
            })
            .collect())
    }

    async fn list_objects(&self, bucket: &str, request: &ListRequest) -> Result<ListPage> {
        let response = self
            .inner
            .list_objects_v2()
            .bucket(bucket)
            .prefix(&request.prefix)
            .max_keys(request.max_keys)
            .set_start_after(request.start_after.clone())
            .set_delimiter(request.delimiter.clone())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, &request.prefix))?;

        let entries = response
            .contents()
            .iter()
            .map(|object| {
                ObjectDescriptor::new(
                    object.key().unwrap_or_default(),
                    object.size().unwrap_or(0).max(0) as u64,
                    epoch_seconds(object.last_modified()),
                )
            })
            .collect();
        let common_prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        Ok(ListPage {
            entries,
            common_prefixes,
            is_truncated: response.is_truncated().unwrap_or(false),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        let response = self
            .inner
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;

        Ok(ObjectMeta {
            key: key.to_string(),
            size: response.content_length().unwrap_or(0).max(0) as u64,
            mtime: epoch_seconds(response.last_modified()),
            etag: trim_etag(response.e_tag()),
            content_type: response.content_type().map(str::to_string),
            storage_class: response.storage_class().map(|sc| sc.as_str().to_string()),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<GetOutput> {
        let response = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;

        let meta = ObjectMeta {
            key: key.to_string(),
            size: response.content_length().unwrap_or(0).max(0) as u64,
            mtime: epoch_seconds(response.last_modified()),
            etag: trim_etag(response.e_tag()),
            content_type: response.content_type().map(str::to_string),
            storage_class: response.storage_class().map(|sc| sc.as_str().to_string()),
        };
        Ok(GetOutput {
            meta,
            body: Box::pin(response.body.into_async_read()),
        })
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Body, options: &PutOptions) -> Result<ObjectMeta> {
        match body {
            Body::Bytes(data) => self.put_buffer(bucket, key, data, options).await,
            Body::Stream { reader, size_hint } => {
                self.upload_stream(bucket, key, reader, size_hint, options)
                    .await
            }
        }
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dest_bucket: &str,
        dest_key: &str,
        options: &PutOptions,
    ) -> Result<ObjectMeta> {
        let mut request = self
            .inner
            .copy_object()
            .copy_source(copy_source(src_bucket, src_key))
            .bucket(dest_bucket)
            .key(dest_key);
        if options.replaces_metadata() {
            request = request.metadata_directive(MetadataDirective::Replace);
        }
        let response = apply_put_options!(request, options)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, src_bucket, src_key))?;

        // Copy responses carry no size
        let mut meta = self.head_object(dest_bucket, dest_key).await?;
        if let Some(etag) = response.copy_object_result().and_then(|r| r.e_tag()) {
            meta.etag = trim_etag(Some(etag));
        }
        Ok(meta)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        match self.inner.delete_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(()),
            Err(e) => match map_sdk_error(e, bucket, key) {
                Error::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }
}
