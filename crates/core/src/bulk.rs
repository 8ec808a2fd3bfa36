//! Multi-object operations
//!
//! Each operation lists its sources once, then hands one job per source to
//! [`driver::run`]. Byte progress of all jobs is merged through a
//! [`ProgressAggregator`] whose total is the byte sum of the listing.

use std::path::{Path, PathBuf};

use crate::client::Client;
use crate::driver::{self, ProgressAggregator, RunSummary};
use crate::error::{Error, Result};
use crate::lister::ListSpec;
use crate::local;
use crate::path::join_key;
use crate::progress::ProgressFn;
use crate::traits::{ObjectDescriptor, PutOptions};
use crate::transfer::{Compression, GetOptions, UploadOptions, is_gzip_key};

/// Options shared by the multi-object operations
#[derive(Clone, Default)]
pub struct BulkOptions {
    /// Which sources take part
    pub spec: ListSpec,
    /// Jobs in flight; the client default when unset
    pub concurrency: Option<usize>,
    /// Gzip uploads
    pub compress: Option<Compression>,
    /// Gunzip `.gz` sources on download, dropping the suffix locally
    pub decompress: bool,
    /// Destination bucket for copy and move; the client's bucket when unset
    pub dest_bucket: Option<String>,
    /// Destination metadata
    pub put: PutOptions,
    pub progress: Option<ProgressFn>,
}

/// Key of `key` relative to `prefix`
///
/// A key equal to the prefix (a single-object source) keeps its basename.
fn relative_key<'a>(prefix: &str, key: &'a str) -> &'a str {
    let rel = key.strip_prefix(prefix).unwrap_or(key).trim_start_matches('/');
    if rel.is_empty() {
        key.rsplit('/').next().unwrap_or(key)
    } else {
        rel
    }
}

/// Local path for `rel` under `root`, refusing to escape it
fn local_target(root: &Path, rel: &str) -> Result<PathBuf> {
    if rel.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(Error::InvalidPath(format!(
            "refusing to write '{rel}' outside {}",
            root.display()
        )));
    }
    Ok(rel
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment)))
}

impl Client {
    fn bulk_concurrency(&self, options: &BulkOptions) -> usize {
        options.concurrency.unwrap_or(self.concurrency)
    }

    fn aggregator(&self, items: &[ObjectDescriptor], options: &BulkOptions) -> std::sync::Arc<ProgressAggregator> {
        let total = items.iter().map(|item| item.size).sum();
        ProgressAggregator::new(Some(total), options.progress.clone(), self.progress_interval)
    }

    /// Upload every file under `root` to `prefix`
    pub async fn upload_files(&self, root: &Path, prefix: &str, options: &BulkOptions) -> Result<RunSummary> {
        let files = local::scan(root, options.spec.filter.clone()).await?;
        let total = files.iter().map(|file| file.size).sum();
        let aggregator = ProgressAggregator::new(Some(total), options.progress.clone(), self.progress_interval);
        tracing::debug!(root = %root.display(), prefix, files = files.len(), "bulk upload");

        let summary = driver::run(files, self.bulk_concurrency(options), |file| {
            let aggregator = aggregator.clone();
            async move {
                let key = join_key(prefix, &file.rel_path);
                let upload = UploadOptions {
                    put: options.put.clone(),
                    compress: options.compress,
                    progress: aggregator.item_callback(),
                };
                self.transfer
                    .upload_file(&file.path, &self.bucket, &key, &upload)
                    .await?;
                Ok(file.size)
            }
        })
        .await;
        aggregator.finish();
        summary
    }

    /// Download every object under `prefix` into `dest_dir`
    pub async fn download_files(&self, prefix: &str, dest_dir: &Path, options: &BulkOptions) -> Result<RunSummary> {
        let listing = self.list(prefix, &options.spec).await?;
        let aggregator = self.aggregator(&listing.files, options);
        tracing::debug!(prefix, dest = %dest_dir.display(), objects = listing.len(), "bulk download");

        let summary = driver::run(listing.files, self.bulk_concurrency(options), |item| {
            let aggregator = aggregator.clone();
            async move {
                let decompress = options.decompress && is_gzip_key(&item.key);
                let mut rel = relative_key(prefix, &item.key);
                if decompress {
                    rel = rel.strip_suffix(".gz").unwrap_or(rel);
                }
                let path = local_target(dest_dir, rel)?;
                let get = GetOptions {
                    decompress,
                    progress: aggregator.item_callback(),
                };
                self.transfer
                    .download_file(&self.bucket, &item.key, &path, &get)
                    .await
            }
        })
        .await;
        aggregator.finish();
        summary
    }

    /// Server-side copy of every object under `src_prefix` to `dest_prefix`
    pub async fn copy_files(&self, src_prefix: &str, dest_prefix: &str, options: &BulkOptions) -> Result<RunSummary> {
        self.relocate(src_prefix, dest_prefix, options, false).await
    }

    /// Copy then delete every object under `src_prefix`
    ///
    /// Each object moves independently; a failure leaves earlier moves done
    /// and may leave the failing object at both places.
    pub async fn move_files(&self, src_prefix: &str, dest_prefix: &str, options: &BulkOptions) -> Result<RunSummary> {
        self.relocate(src_prefix, dest_prefix, options, true).await
    }

    async fn relocate(
        &self,
        src_prefix: &str,
        dest_prefix: &str,
        options: &BulkOptions,
        remove_source: bool,
    ) -> Result<RunSummary> {
        let dest_bucket = options.dest_bucket.as_deref().unwrap_or(&self.bucket);
        let listing = self.list(src_prefix, &options.spec).await?;
        let aggregator = self.aggregator(&listing.files, options);
        tracing::debug!(
            src_prefix,
            dest_bucket,
            dest_prefix,
            objects = listing.len(),
            remove_source,
            "bulk copy"
        );

        let summary = driver::run(listing.files, self.bulk_concurrency(options), |item| {
            let aggregator = aggregator.clone();
            async move {
                let dest_key = join_key(dest_prefix, relative_key(src_prefix, &item.key));
                if remove_source {
                    self.codec
                        .move_object(&self.bucket, &item.key, dest_bucket, &dest_key, &options.put)
                        .await?;
                } else {
                    self.codec
                        .copy(&self.bucket, &item.key, dest_bucket, &dest_key, &options.put)
                        .await?;
                }
                aggregator.add(item.size);
                Ok(item.size)
            }
        })
        .await;
        aggregator.finish();
        summary
    }

    /// Delete every object under `prefix`
    ///
    /// Record cache entries for the deleted keys are evicted.
    pub async fn delete_files(&self, prefix: &str, options: &BulkOptions) -> Result<RunSummary> {
        let listing = self.list(prefix, &options.spec).await?;
        let aggregator = self.aggregator(&listing.files, options);
        tracing::debug!(prefix, objects = listing.len(), "bulk delete");

        let summary = driver::run(listing.files, self.bulk_concurrency(options), |item| {
            let aggregator = aggregator.clone();
            async move {
                self.codec.delete(&self.bucket, &item.key).await?;
                aggregator.add(item.size);
                Ok(item.size)
            }
        })
        .await;
        aggregator.finish();
        summary
    }
}
