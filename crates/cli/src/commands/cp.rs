//! cp command - Copy objects
//!
//! Copies objects between the local filesystem and S3, or between S3
//! locations. With `-r` the source is a prefix (or directory) and every
//! match is copied under the target.

use std::path::Path;

use clap::Args;
use serde::Serialize;

use s3kv_core::{
    BulkOptions, Compression, GetOptions, Location, PutOptions, Result, RunSummary, S3Url, UploadOptions, join_key,
    parse_location,
};

use super::{Context, FilterArgs};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, ProgressBar, format_size};

/// Copy objects
#[derive(Args, Debug)]
pub struct CpArgs {
    /// Source path (local path or s3://bucket/key)
    pub source: String,

    /// Destination path (local path or s3://bucket/key)
    pub target: String,

    /// Copy everything under the source prefix or directory
    #[arg(short, long)]
    pub recursive: bool,

    /// Gzip uploads
    #[arg(short = 'z', long)]
    pub compress: bool,

    /// Gunzip .gz objects on download, dropping the suffix
    #[arg(long)]
    pub decompress: bool,

    /// Transfers in flight for recursive copies
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Storage class for destination (S3 only)
    #[arg(long)]
    pub storage_class: Option<String>,

    /// Content type for uploaded files
    #[arg(long)]
    pub content_type: Option<String>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Debug, Serialize)]
pub(crate) struct TransferOutput {
    pub status: &'static str,
    pub source: String,
    pub target: String,
    pub objects: u64,
    pub size_bytes: u64,
}

impl TransferOutput {
    pub(crate) fn new(source: &str, target: &str, summary: &RunSummary) -> Self {
        Self {
            status: "success",
            source: source.to_string(),
            target: target.to_string(),
            objects: summary.count,
            size_bytes: summary.total_bytes,
        }
    }

    pub(crate) fn report(&self, formatter: &Formatter, verb: &str) {
        if formatter.is_json() {
            formatter.json(self);
        } else {
            formatter.success(&format!(
                "{verb} {} object(s), {}: {} -> {}",
                self.objects,
                format_size(self.size_bytes),
                self.source,
                self.target
            ));
        }
    }
}

/// Destination key for a single-object copy
///
/// A directory-style target (empty key or trailing `/`) receives the
/// source's basename.
pub(crate) fn single_target_key(target: &S3Url, source_name: &str) -> String {
    if target.is_dir() {
        join_key(&target.key, source_name)
    } else {
        target.key.clone()
    }
}

fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

pub(crate) fn put_options(content_type: Option<String>, storage_class: Option<String>) -> PutOptions {
    PutOptions {
        content_type,
        storage_class,
        ..Default::default()
    }
}

fn bulk_options(args: &CpArgs, progress: &ProgressBar) -> Result<BulkOptions> {
    Ok(BulkOptions {
        spec: args.filter.to_spec()?,
        concurrency: args.concurrency,
        compress: args.compress.then_some(Compression::Default),
        decompress: args.decompress,
        dest_bucket: None,
        put: put_options(args.content_type.clone(), args.storage_class.clone()),
        progress: progress.callback(),
    })
}

/// Execute the cp command
pub async fn execute(args: CpArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let source = match parse_location(&args.source) {
        Ok(location) => location,
        Err(e) => return formatter.fail("Invalid source path", &e),
    };
    let target = match parse_location(&args.target) {
        Ok(location) => location,
        Err(e) => return formatter.fail("Invalid target path", &e),
    };

    match (&source, &target) {
        (Location::Local(src), Location::Remote(dst)) => upload(src, dst, &args, ctx).await,
        (Location::Remote(src), Location::Local(dst)) => download(src, dst, &args, ctx).await,
        (Location::Remote(src), Location::Remote(dst)) => copy_remote(src, dst, &args, ctx).await,
        (Location::Local(_), Location::Local(_)) => {
            formatter.error("Cannot copy between two local paths. Use system cp command.");
            ExitCode::UsageError
        }
    }
}

async fn upload(src: &Path, dst: &S3Url, args: &CpArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    if !src.exists() {
        formatter.error(&format!("Source not found: {}", src.display()));
        return ExitCode::NotFound;
    }
    if src.is_dir() && !args.recursive {
        formatter.error("Source is a directory. Use -r/--recursive to copy directories.");
        return ExitCode::UsageError;
    }
    let client = match ctx.client(Some(&dst.bucket)).await {
        Ok(client) => client,
        Err(e) => return formatter.fail("Failed to connect", &e),
    };

    if src.is_dir() {
        let progress = ProgressBar::new(formatter.config(), Some(0));
        let options = match bulk_options(args, &progress) {
            Ok(options) => options,
            Err(e) => return formatter.fail("Invalid filter", &e),
        };
        let result = client.upload_files(src, &dst.dir_prefix(), &options).await;
        progress.finish_and_clear();
        return match result {
            Ok(summary) => {
                TransferOutput::new(&src.display().to_string(), &dst.to_string(), &summary)
                    .report(formatter, "Uploaded");
                ExitCode::Success
            }
            Err(e) => formatter.fail("Upload failed", &e),
        };
    }

    let name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let key = single_target_key(dst, &name);
    let progress = ProgressBar::new(formatter.config(), None);
    let options = UploadOptions {
        put: put_options(args.content_type.clone(), args.storage_class.clone()),
        compress: args.compress.then_some(Compression::Default),
        progress: progress.callback(),
    };
    let result = client
        .transfer()
        .upload_file(src, &dst.bucket, &key, &options)
        .await;
    progress.finish_and_clear();

    match result {
        Ok(meta) => {
            let summary = RunSummary {
                count: 1,
                total_bytes: meta.size,
            };
            let target = S3Url::new(dst.bucket.clone(), key);
            TransferOutput::new(&src.display().to_string(), &target.to_string(), &summary)
                .report(formatter, "Uploaded");
            ExitCode::Success
        }
        Err(e) => formatter.fail("Upload failed", &e),
    }
}

async fn download(src: &S3Url, dst: &Path, args: &CpArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let client = match ctx.client(Some(&src.bucket)).await {
        Ok(client) => client,
        Err(e) => return formatter.fail("Failed to connect", &e),
    };

    if args.recursive || src.is_dir() {
        if !args.recursive {
            formatter.error("Source is a prefix. Use -r/--recursive to copy prefixes.");
            return ExitCode::UsageError;
        }
        let progress = ProgressBar::new(formatter.config(), Some(0));
        let options = match bulk_options(args, &progress) {
            Ok(options) => options,
            Err(e) => return formatter.fail("Invalid filter", &e),
        };
        let result = client.download_files(&src.key, dst, &options).await;
        progress.finish_and_clear();
        return match result {
            Ok(summary) => {
                TransferOutput::new(&src.to_string(), &dst.display().to_string(), &summary)
                    .report(formatter, "Downloaded");
                ExitCode::Success
            }
            Err(e) => formatter.fail("Download failed", &e),
        };
    }

    let decompress = args.decompress && src.key.ends_with(".gz");
    let mut name = basename(&src.key).to_string();
    if decompress {
        name.truncate(name.len() - ".gz".len());
    }
    let path = if dst.is_dir() || args.target.ends_with('/') {
        dst.join(&name)
    } else {
        dst.to_path_buf()
    };

    let progress = ProgressBar::new(formatter.config(), None);
    let options = GetOptions {
        decompress,
        progress: progress.callback(),
    };
    let result = client
        .transfer()
        .download_file(&src.bucket, &src.key, &path, &options)
        .await;
    progress.finish_and_clear();

    match result {
        Ok(bytes) => {
            let summary = RunSummary {
                count: 1,
                total_bytes: bytes,
            };
            TransferOutput::new(&src.to_string(), &path.display().to_string(), &summary)
                .report(formatter, "Downloaded");
            ExitCode::Success
        }
        Err(e) => formatter.fail("Download failed", &e),
    }
}

async fn copy_remote(src: &S3Url, dst: &S3Url, args: &CpArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let client = match ctx.client(Some(&src.bucket)).await {
        Ok(client) => client,
        Err(e) => return formatter.fail("Failed to connect", &e),
    };

    if args.recursive {
        let progress = ProgressBar::new(formatter.config(), Some(0));
        let mut options = match bulk_options(args, &progress) {
            Ok(options) => options,
            Err(e) => return formatter.fail("Invalid filter", &e),
        };
        options.dest_bucket = Some(dst.bucket.clone());
        let result = client.copy_files(&src.key, &dst.dir_prefix(), &options).await;
        progress.finish_and_clear();
        return match result {
            Ok(summary) => {
                TransferOutput::new(&src.to_string(), &dst.to_string(), &summary).report(formatter, "Copied");
                ExitCode::Success
            }
            Err(e) => formatter.fail("Copy failed", &e),
        };
    }

    if src.is_dir() {
        formatter.error("Source is a prefix. Use -r/--recursive to copy prefixes.");
        return ExitCode::UsageError;
    }
    let key = single_target_key(dst, basename(&src.key));
    let options = put_options(args.content_type.clone(), args.storage_class.clone());
    match client
        .codec()
        .copy(&src.bucket, &src.key, &dst.bucket, &key, &options)
        .await
    {
        Ok(meta) => {
            let summary = RunSummary {
                count: 1,
                total_bytes: meta.size,
            };
            let target = S3Url::new(dst.bucket.clone(), key);
            TransferOutput::new(&src.to_string(), &target.to_string(), &summary).report(formatter, "Copied");
            ExitCode::Success
        }
        Err(e) => formatter.fail("Copy failed", &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_target_key() {
        let dir = S3Url::new("bucket", "backup/");
        assert_eq!(single_target_key(&dir, "a.txt"), "backup/a.txt");

        let root = S3Url::new("bucket", "");
        assert_eq!(single_target_key(&root, "a.txt"), "a.txt");

        let exact = S3Url::new("bucket", "backup/renamed.txt");
        assert_eq!(single_target_key(&exact, "a.txt"), "backup/renamed.txt");
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("a/b/c.gz"), "c.gz");
        assert_eq!(basename("c"), "c");
    }

    #[test]
    fn test_transfer_output_json_shape() {
        let summary = RunSummary {
            count: 3,
            total_bytes: 42,
        };
        let output = TransferOutput::new("./data", "s3://bucket/data/", &summary);
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["objects"], 3);
        assert_eq!(json["size_bytes"], 42);
        assert_eq!(json["status"], "success");
    }
}
