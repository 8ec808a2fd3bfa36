//! ls command - List objects under a prefix
//!
//! Lists every object below the prefix, or one delimiter level with
//! `--folders`.

use clap::Args;
use serde::Serialize;

use s3kv_core::{ObjectDescriptor, parse_remote};

use super::{Context, FilterArgs};
use crate::exit_code::ExitCode;
use crate::output::{format_mtime, format_size};

/// List objects
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Remote prefix (s3://bucket[/prefix])
    pub path: String,

    /// List one level: sub-prefixes and the objects directly below
    #[arg(long)]
    pub folders: bool,

    /// Summarize output (show totals only)
    #[arg(long)]
    pub summarize: bool,

    #[command(flatten)]
    pub filter: FilterArgs,
}

/// Output structure for ls command (JSON format)
#[derive(Debug, Serialize)]
struct LsOutput {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    folders: Vec<String>,
    items: Vec<ObjectDescriptor>,
    total_objects: usize,
    total_size_bytes: u64,
}

/// Execute the ls command
pub async fn execute(args: LsArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let url = match parse_remote(&args.path) {
        Ok(url) => url,
        Err(e) => return formatter.fail("Invalid path", &e),
    };
    let spec = match args.filter.to_spec() {
        Ok(spec) => spec,
        Err(e) => return formatter.fail("Invalid filter", &e),
    };
    let client = match ctx.client(Some(&url.bucket)).await {
        Ok(client) => client,
        Err(e) => return formatter.fail("Failed to connect", &e),
    };

    let output = if args.folders {
        match client.list_folders(&url.key).await {
            Ok(listing) => {
                let files: Vec<ObjectDescriptor> = listing
                    .files
                    .into_iter()
                    .filter(|f| spec.filter.matches_object(f))
                    .collect();
                LsOutput {
                    folders: listing.folders,
                    total_objects: files.len(),
                    total_size_bytes: files.iter().map(|f| f.size).sum(),
                    items: files,
                }
            }
            Err(e) => return formatter.fail("Failed to list objects", &e),
        }
    } else {
        match client.list(&url.key, &spec).await {
            Ok(listing) => LsOutput {
                folders: Vec::new(),
                total_objects: listing.len(),
                total_size_bytes: listing.total_bytes,
                items: listing.files,
            },
            Err(e) => return formatter.fail("Failed to list objects", &e),
        }
    };

    if formatter.is_json() {
        formatter.json(&output);
        return ExitCode::Success;
    }

    if !args.summarize {
        for folder in &output.folders {
            formatter.println(&format!("{:>19} {:>10} {folder}", "", "PRE"));
        }
        for item in &output.items {
            formatter.println(&format!(
                "{} {:>10} {}",
                format_mtime(item.mtime),
                format_size(item.size),
                item.key
            ));
        }
    }
    if args.summarize || output.total_objects > 1 {
        formatter.println(&format!(
            "Total: {} objects, {}",
            output.total_objects,
            format_size(output.total_size_bytes)
        ));
    }
    ExitCode::Success
}
