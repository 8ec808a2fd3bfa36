//! update command - Edit a JSON record by dot paths
//!
//! Assignments are applied in order to the stored record and the result is
//! written back.

use clap::Args;
use serde_json::Value;

use s3kv_core::{Error, Result, Update};

use super::{Context, record_target};
use crate::exit_code::ExitCode;

/// Set or delete values inside a JSON record
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Record key (key in the default bucket, or s3://bucket/key)
    pub key: String,

    /// Assignments as PATH=VALUE; VALUE is JSON, or a plain string
    pub assignments: Vec<String>,

    /// Remove the value at PATH (repeatable)
    #[arg(long = "delete", value_name = "PATH")]
    pub delete: Vec<String>,

    /// Start from an empty object when the record does not exist
    #[arg(long)]
    pub create: bool,

    /// Store indented JSON
    #[arg(long)]
    pub pretty: bool,
}

/// Parse `path=value`
///
/// The value is read as JSON when it parses, so `n=5` stores a number and
/// `name=bob` stores the string "bob".
fn parse_assignment(input: &str) -> Result<(String, Update)> {
    let (path, raw) = input.split_once('=').ok_or_else(|| {
        Error::InvalidArgument(format!("'{input}' is not an assignment. Use PATH=VALUE"))
    })?;
    if path.is_empty() {
        return Err(Error::InvalidArgument(format!("'{input}' has an empty path")));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((path.to_string(), Update::Set(value)))
}

fn build_updates(args: &UpdateArgs) -> Result<Vec<(String, Update)>> {
    let mut updates = args
        .assignments
        .iter()
        .map(|a| parse_assignment(a))
        .collect::<Result<Vec<_>>>()?;
    updates.extend(args.delete.iter().map(|path| (path.clone(), Update::Delete)));
    if updates.is_empty() {
        return Err(Error::InvalidArgument("nothing to update".into()));
    }
    Ok(updates)
}

/// Execute the update command
pub async fn execute(args: UpdateArgs, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let (bucket, key) = match record_target(&args.key) {
        Ok(target) => target,
        Err(e) => return formatter.fail("Invalid key", &e),
    };
    let updates = match build_updates(&args) {
        Ok(updates) => updates,
        Err(e) => return formatter.fail("Invalid update", &e),
    };
    let client = match ctx.client(bucket.as_deref()).await {
        Ok(client) => client,
        Err(e) => return formatter.fail("Failed to connect", &e),
    };

    let result = if args.create {
        client.update_or_create(&key, updates, args.pretty).await
    } else {
        client.update(&key, updates, args.pretty).await
    };
    match result {
        Ok(value) => {
            if formatter.is_json() {
                formatter.json(&value);
            } else {
                formatter.success(&format!("Updated {key}"));
            }
            ExitCode::Success
        }
        Err(e) => formatter.fail("Failed to update record", &e),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("age=42").unwrap(),
            ("age".to_string(), Update::Set(json!(42)))
        );
        assert_eq!(
            parse_assignment("name=bob").unwrap(),
            ("name".to_string(), Update::Set(json!("bob")))
        );
        assert_eq!(
            parse_assignment("tags=[\"a\",\"b\"]").unwrap(),
            ("tags".to_string(), Update::Set(json!(["a", "b"])))
        );
        assert_eq!(
            parse_assignment("expr=a=b").unwrap(),
            ("expr".to_string(), Update::Set(json!("a=b")))
        );
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=5").is_err());
    }

    #[test]
    fn test_build_updates_requires_something() {
        let args = UpdateArgs {
            key: "k".into(),
            assignments: vec![],
            delete: vec![],
            create: false,
            pretty: false,
        };
        assert!(matches!(build_updates(&args), Err(Error::InvalidArgument(_))));

        let args = UpdateArgs {
            delete: vec!["a.b".into()],
            ..args
        };
        assert_eq!(build_updates(&args).unwrap(), vec![("a.b".to_string(), Update::Delete)]);
    }
}
