//! pipe command - Stream stdin to an object
//!
//! Reads standard input until EOF and uploads it as one object, so large
//! inputs never have to fit in memory.

use clap::Args;

use s3kv_core::{Compression, PutOptions, UploadOptions, parse_remote};

use super::Context;
use crate::exit_code::ExitCode;
use crate::output::ProgressBar;

/// Stream stdin to an object
#[derive(Args, Debug)]
pub struct PipeArgs {
    /// Destination object (s3://bucket/key)
    pub target: String,

    /// Content type stored with the object
    #[arg(long)]
    pub content_type: Option<String>,

    /// Storage class (e.g. STANDARD_IA)
    #[arg(long)]
    pub storage_class: Option<String>,

    /// Gzip the stream while uploading
    #[arg(short = 'z', long)]
    pub compress: bool,
}

/// Execute the pipe command
pub async fn execute(args: PipeArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let url = match parse_remote(&args.target) {
        Ok(url) if !url.is_dir() => url,
        Ok(_) => {
            formatter.error(&format!("'{}' does not name an object", args.target));
            return ExitCode::UsageError;
        }
        Err(e) => return formatter.fail("Invalid path", &e),
    };
    let client = match ctx.client(Some(&url.bucket)).await {
        Ok(client) => client,
        Err(e) => return formatter.fail("Failed to connect", &e),
    };

    let progress = ProgressBar::new(formatter.config(), None);
    let options = UploadOptions {
        put: PutOptions {
            content_type: args.content_type,
            storage_class: args.storage_class,
            ..Default::default()
        },
        compress: args.compress.then_some(Compression::Default),
        progress: progress.callback(),
    };

    let result = client
        .put_stream(&url.key, Box::pin(tokio::io::stdin()), None, &options)
        .await;
    progress.finish_and_clear();

    match result {
        Ok(meta) => {
            if formatter.is_json() {
                formatter.json(&meta);
            } else {
                formatter.success(&format!("Uploaded {url} ({} bytes)", meta.size));
            }
            ExitCode::Success
        }
        Err(e) => formatter.fail("Failed to upload", &e),
    }
}
