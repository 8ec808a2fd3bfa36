//! mv command - Move objects between S3 locations
//!
//! A move is a server-side copy followed by deleting the source. It is not
//! atomic: a failed delete leaves the object at both places.

use clap::Args;

use s3kv_core::{BulkOptions, Location, RunSummary, S3Url, parse_location};

use super::cp::{TransferOutput, put_options, single_target_key};
use super::{Context, FilterArgs};
use crate::exit_code::ExitCode;
use crate::output::ProgressBar;

/// Move objects
#[derive(Args, Debug)]
pub struct MvArgs {
    /// Source path (s3://bucket/key)
    pub source: String,

    /// Destination path (s3://bucket/key)
    pub target: String,

    /// Move everything under the source prefix
    #[arg(short, long)]
    pub recursive: bool,

    /// Moves in flight for recursive moves
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Storage class for destination
    #[arg(long)]
    pub storage_class: Option<String>,

    /// Content type for the destination
    #[arg(long)]
    pub content_type: Option<String>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

/// Execute the mv command
pub async fn execute(args: MvArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let source = match parse_location(&args.source) {
        Ok(location) => location,
        Err(e) => return formatter.fail("Invalid source path", &e),
    };
    let target = match parse_location(&args.target) {
        Ok(location) => location,
        Err(e) => return formatter.fail("Invalid target path", &e),
    };

    let (Location::Remote(src), Location::Remote(dst)) = (&source, &target) else {
        formatter.error("mv only moves between S3 locations. Use cp, then rm or a local mv.");
        return ExitCode::UsageError;
    };
    if args.recursive {
        move_prefix(src, dst, &args, ctx).await
    } else {
        move_single(src, dst, &args, ctx).await
    }
}

async fn move_prefix(src: &S3Url, dst: &S3Url, args: &MvArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let spec = match args.filter.to_spec() {
        Ok(spec) => spec,
        Err(e) => return formatter.fail("Invalid filter", &e),
    };
    let client = match ctx.client(Some(&src.bucket)).await {
        Ok(client) => client,
        Err(e) => return formatter.fail("Failed to connect", &e),
    };

    let progress = ProgressBar::new(formatter.config(), Some(0));
    let options = BulkOptions {
        spec,
        concurrency: args.concurrency,
        dest_bucket: Some(dst.bucket.clone()),
        put: put_options(args.content_type.clone(), args.storage_class.clone()),
        progress: progress.callback(),
        ..Default::default()
    };
    let result = client.move_files(&src.key, &dst.dir_prefix(), &options).await;
    progress.finish_and_clear();

    match result {
        Ok(summary) => {
            TransferOutput::new(&src.to_string(), &dst.to_string(), &summary).report(formatter, "Moved");
            ExitCode::Success
        }
        Err(e) => formatter.fail("Move failed", &e),
    }
}

async fn move_single(src: &S3Url, dst: &S3Url, args: &MvArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    if src.is_dir() {
        formatter.error("Source is a prefix. Use -r/--recursive to move prefixes.");
        return ExitCode::UsageError;
    }
    let client = match ctx.client(Some(&src.bucket)).await {
        Ok(client) => client,
        Err(e) => return formatter.fail("Failed to connect", &e),
    };

    let name = src.key.rsplit('/').next().unwrap_or(&src.key);
    let key = single_target_key(dst, name);
    let options = put_options(args.content_type.clone(), args.storage_class.clone());
    match client
        .codec()
        .move_object(&src.bucket, &src.key, &dst.bucket, &key, &options)
        .await
    {
        Ok(meta) => {
            let summary = RunSummary {
                count: 1,
                total_bytes: meta.size,
            };
            let target = S3Url::new(dst.bucket.clone(), key);
            TransferOutput::new(&src.to_string(), &target.to_string(), &summary).report(formatter, "Moved");
            ExitCode::Success
        }
        Err(e) => formatter.fail("Move failed", &e),
    }
}
