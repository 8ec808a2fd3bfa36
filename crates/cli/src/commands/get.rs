//! get command - Print a JSON record

use clap::Args;

use s3kv_core::Error;

use super::{Context, record_target};
use crate::exit_code::ExitCode;

/// Print a JSON record, or one value inside it
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Record key (key in the default bucket, or s3://bucket/key)
    pub key: String,

    /// Dot path of a value inside the record (e.g. address.city, tags.0)
    #[arg(long)]
    pub path: Option<String>,
}

/// Execute the get command
pub async fn execute(args: GetArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let (bucket, key) = match record_target(&args.key) {
        Ok(target) => target,
        Err(e) => return formatter.fail("Invalid key", &e),
    };
    let client = match ctx.client(bucket.as_deref()).await {
        Ok(client) => client,
        Err(e) => return formatter.fail("Failed to connect", &e),
    };

    match args.path {
        Some(path) => match client.get_path(&key, &path).await {
            Ok(Some(value)) => formatter.json(&value),
            Ok(None) => {
                return formatter.fail(
                    "Failed to read value",
                    &Error::NotFound(format!("{key}: no value at '{path}'")),
                );
            }
            Err(e) => return formatter.fail("Failed to read value", &e),
        },
        None => match client.get(&key).await {
            Ok(record) => {
                tracing::debug!(key = %key, cached = record.is_cached(), "record read");
                formatter.json(&*record.value);
            }
            Err(e) => return formatter.fail("Failed to read record", &e),
        },
    }
    ExitCode::Success
}
