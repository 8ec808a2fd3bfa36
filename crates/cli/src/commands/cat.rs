//! cat command - Stream an object to stdout

use clap::Args;
use tokio::io::AsyncWriteExt;

use s3kv_core::{Error, GetOptions, is_gzip_key, parse_remote};

use super::Context;
use crate::exit_code::ExitCode;

/// Stream an object to stdout
#[derive(Args, Debug)]
pub struct CatArgs {
    /// Object path (s3://bucket/key)
    pub path: String,

    /// Gunzip the body; implied for keys ending in .gz
    #[arg(short = 'z', long)]
    pub decompress: bool,

    /// Print the raw bytes of a .gz object
    #[arg(long, conflicts_with = "decompress")]
    pub raw: bool,
}

/// Execute the cat command
pub async fn execute(args: CatArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let url = match parse_remote(&args.path) {
        Ok(url) => url,
        Err(e) => return formatter.fail("Invalid path", &e),
    };
    let client = match ctx.client(Some(&url.bucket)).await {
        Ok(client) => client,
        Err(e) => return formatter.fail("Failed to connect", &e),
    };

    let options = GetOptions {
        decompress: args.decompress || (!args.raw && is_gzip_key(&url.key)),
        progress: None,
    };
    let mut output = match client.get_stream(&url.key, &options).await {
        Ok(output) => output,
        Err(e) => return formatter.fail("Failed to read object", &e),
    };

    let mut stdout = tokio::io::stdout();
    let copied = tokio::io::copy(&mut output.body, &mut stdout).await;
    if let Err(e) = stdout.flush().await {
        return formatter.fail("Failed to write output", &Error::Io(e));
    }
    match copied {
        Ok(bytes) => {
            tracing::debug!(key = %url, bytes, "object streamed");
            ExitCode::Success
        }
        Err(e) if options.decompress => {
            formatter.fail("Failed to read object", &Error::Compression(e.to_string()))
        }
        Err(e) => formatter.fail("Failed to read object", &Error::Io(e)),
    }
}
