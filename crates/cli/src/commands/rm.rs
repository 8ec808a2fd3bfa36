//! rm command - Remove objects
//!
//! Removes one object, or with `-r` every object under a prefix. Record
//! cache entries for removed keys are evicted.

use clap::Args;
use serde::Serialize;

use s3kv_core::{BulkOptions, parse_remote};

use super::{Context, FilterArgs};
use crate::exit_code::ExitCode;
use crate::output::{ProgressBar, format_size};

/// Remove objects
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Object or prefix to remove (s3://bucket/key or s3://bucket/prefix/)
    pub path: String,

    /// Remove every object under the prefix
    #[arg(short, long)]
    pub recursive: bool,

    /// Deletes in flight for recursive removal
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Debug, Serialize)]
struct RmOutput {
    status: &'static str,
    path: String,
    deleted: u64,
    size_bytes: u64,
}

/// Execute the rm command
pub async fn execute(args: RmArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let url = match parse_remote(&args.path) {
        Ok(url) => url,
        Err(e) => return formatter.fail("Invalid path", &e),
    };
    if url.is_dir() && !args.recursive {
        formatter.error("Path is a prefix. Use -r/--recursive to remove everything under it.");
        return ExitCode::UsageError;
    }
    let client = match ctx.client(Some(&url.bucket)).await {
        Ok(client) => client,
        Err(e) => return formatter.fail("Failed to connect", &e),
    };

    let output = if args.recursive {
        let spec = match args.filter.to_spec() {
            Ok(spec) => spec,
            Err(e) => return formatter.fail("Invalid filter", &e),
        };
        let progress = ProgressBar::new(formatter.config(), Some(0));
        let options = BulkOptions {
            spec,
            concurrency: args.concurrency,
            progress: progress.callback(),
            ..Default::default()
        };
        let result = client.delete_files(&url.key, &options).await;
        progress.finish_and_clear();
        match result {
            Ok(summary) => RmOutput {
                status: "success",
                path: url.to_string(),
                deleted: summary.count,
                size_bytes: summary.total_bytes,
            },
            Err(e) => return formatter.fail("Remove failed", &e),
        }
    } else {
        match client.delete(&url.key).await {
            Ok(meta) => RmOutput {
                status: "success",
                path: url.to_string(),
                deleted: 1,
                size_bytes: meta.size,
            },
            Err(e) => return formatter.fail("Remove failed", &e),
        }
    };

    if formatter.is_json() {
        formatter.json(&output);
    } else {
        formatter.success(&format!(
            "Removed {} object(s), {}: {}",
            output.deleted,
            format_size(output.size_bytes),
            output.path
        ));
    }
    ExitCode::Success
}
