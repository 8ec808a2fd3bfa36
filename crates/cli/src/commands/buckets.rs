//! buckets command - List buckets visible to the profile

use clap::Args;

use crate::exit_code::ExitCode;
use crate::output::format_mtime;

use super::Context;

/// List buckets
#[derive(Args, Debug)]
pub struct BucketsArgs {}

/// Execute the buckets command
pub async fn execute(_args: BucketsArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let store = match ctx.store().await {
        Ok(store) => store,
        Err(e) => return formatter.fail("Failed to connect", &e),
    };

    let buckets = match store.list_buckets().await {
        Ok(buckets) => buckets,
        Err(e) => return formatter.fail("Failed to list buckets", &e),
    };

    if formatter.is_json() {
        formatter.json(&buckets);
    } else {
        let rows = buckets
            .into_iter()
            .map(|b| {
                let created = b
                    .created
                    .map(|ts| format_mtime(ts.as_second()))
                    .unwrap_or_default();
                vec![created, b.name]
            })
            .collect();
        formatter.table(&["CREATED", "NAME"], rows);
    }
    ExitCode::Success
}
