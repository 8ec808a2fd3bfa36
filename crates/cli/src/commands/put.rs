//! put command - Store a JSON record

use clap::Args;
use serde_json::Value;
use tokio::io::AsyncReadExt;

use s3kv_core::Error;

use super::{Context, record_target};
use crate::exit_code::ExitCode;

/// Store a JSON record, replacing any existing one
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Record key (key in the default bucket, or s3://bucket/key)
    pub key: String,

    /// JSON document; read from stdin when omitted
    pub value: Option<String>,

    /// Store indented JSON
    #[arg(long)]
    pub pretty: bool,
}

async fn read_stdin() -> std::io::Result<String> {
    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    Ok(input)
}

/// Execute the put command
pub async fn execute(args: PutArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let (bucket, key) = match record_target(&args.key) {
        Ok(target) => target,
        Err(e) => return formatter.fail("Invalid key", &e),
    };

    let text = match args.value {
        Some(text) => text,
        None => match read_stdin().await {
            Ok(text) => text,
            Err(e) => return formatter.fail("Failed to read stdin", &Error::Io(e)),
        },
    };
    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            return formatter.fail(
                "Invalid JSON",
                &Error::InvalidArgument(e.to_string()),
            );
        }
    };

    let client = match ctx.client(bucket.as_deref()).await {
        Ok(client) => client,
        Err(e) => return formatter.fail("Failed to connect", &e),
    };
    match client.put(&key, &value, args.pretty).await {
        Ok(meta) => {
            if formatter.is_json() {
                formatter.json(&meta);
            } else {
                formatter.success(&format!("Stored {} ({} bytes)", key, meta.size));
            }
            ExitCode::Success
        }
        Err(e) => formatter.fail("Failed to store record", &e),
    }
}
