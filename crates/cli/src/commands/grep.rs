//! grep command - Search object contents line by line
//!
//! Every object under the prefix is read as text; `.gz` objects are
//! gunzipped first. Matches print as `key:line:text`.

use std::ops::ControlFlow;

use clap::Args;
use regex::Regex;

use s3kv_core::{Error, GrepMatch, parse_remote};

use super::{Context, FilterArgs};
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Search object contents
#[derive(Args, Debug)]
pub struct GrepArgs {
    /// Regular expression matched against each line
    pub pattern: String,

    /// Prefix to search (s3://bucket[/prefix])
    pub path: String,

    /// Stop after this many matching lines in total
    #[arg(short = 'm', long)]
    pub max_lines: Option<u64>,

    /// Case-insensitive matching
    #[arg(short = 'i', long)]
    pub ignore_case: bool,

    #[command(flatten)]
    pub filter: FilterArgs,
}

fn build_pattern(pattern: &str, ignore_case: bool) -> Result<Regex, Error> {
    let source = if ignore_case {
        format!("(?i){pattern}")
    } else {
        pattern.to_string()
    };
    Regex::new(&source).map_err(|e| Error::InvalidArgument(format!("bad pattern '{pattern}': {e}")))
}

fn print_match(formatter: &Formatter, found: &GrepMatch) {
    if formatter.is_json() {
        match serde_json::to_string(found) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("Error serializing output: {e}"),
        }
    } else {
        formatter.println(&format!("{}:{}:{}", found.key, found.line_number, found.line));
    }
}

/// Execute the grep command
pub async fn execute(args: GrepArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let pattern = match build_pattern(&args.pattern, args.ignore_case) {
        Ok(pattern) => pattern,
        Err(e) => return formatter.fail("Invalid pattern", &e),
    };
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

    let result = client
        .grep(&url.key, &spec, &pattern, args.max_lines, |found| {
            print_match(formatter, &found);
            ControlFlow::Continue(())
        })
        .await;
    match result {
        Ok(matches) => {
            tracing::debug!(prefix = %url, matches, "grep finished");
            ExitCode::Success
        }
        Err(e) => formatter.fail("Search failed", &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_pattern() {
        let pattern = build_pattern("error", true).unwrap();
        assert!(pattern.is_match("ERROR: disk full"));
        assert!(!build_pattern("error", false).unwrap().is_match("ERROR"));
        assert!(matches!(build_pattern("(", false), Err(Error::InvalidArgument(_))));
    }
}
