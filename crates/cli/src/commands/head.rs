//! head command - Show object metadata
//!
//! Prints size, modification time and the stored headers of one object
//! without reading its body.

use clap::Args;

use s3kv_core::parse_remote;

use super::Context;
use crate::exit_code::ExitCode;
use crate::output::{format_mtime, format_size};

/// Show object metadata
#[derive(Args, Debug)]
pub struct HeadArgs {
    /// Object path (s3://bucket/key)
    pub path: String,
}

/// Execute the head command
pub async fn execute(args: HeadArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let url = match parse_remote(&args.path) {
        Ok(url) if !url.is_dir() => url,
        Ok(_) => {
            formatter.error(&format!("'{}' does not name an object", args.path));
            return ExitCode::UsageError;
        }
        Err(e) => return formatter.fail("Invalid path", &e),
    };
    let client = match ctx.client(Some(&url.bucket)).await {
        Ok(client) => client,
        Err(e) => return formatter.fail("Failed to connect", &e),
    };

    let meta = match client.head(&url.key, false).await {
        Ok(Some(meta)) => meta,
        Ok(None) => {
            formatter.error(&format!("Object not found: {url}"));
            return ExitCode::NotFound;
        }
        Err(e) => return formatter.fail("Failed to read metadata", &e),
    };

    if formatter.is_json() {
        formatter.json(&meta);
        return ExitCode::Success;
    }

    formatter.println(&format!("Key:          {url}"));
    formatter.println(&format!("Size:         {} ({} bytes)", format_size(meta.size), meta.size));
    formatter.println(&format!("Modified:     {}", format_mtime(meta.mtime)));
    if let Some(etag) = &meta.etag {
        formatter.println(&format!("ETag:         {etag}"));
    }
    if let Some(content_type) = &meta.content_type {
        formatter.println(&format!("Content-Type: {content_type}"));
    }
    if let Some(class) = &meta.storage_class {
        formatter.println(&format!("Class:        {class}"));
    }
    ExitCode::Success
}
