//! Profile management commands
//!
//! Profiles are named references to S3-compatible endpoints, including
//! connection details, credentials and record defaults.

use clap::Subcommand;
use serde::Serialize;

use s3kv_core::{Profile, ProfileManager};

use super::Context;
use crate::exit_code::ExitCode;

/// Profile subcommands for managing store connections
#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Add or update a profile
    Set(SetArgs),

    /// List all configured profiles
    List,

    /// Remove a profile
    Remove(NameArgs),

    /// Use a profile when none is named
    Default(NameArgs),
}

/// Arguments for the `profile set` command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Profile name (e.g., "local", "aws", "minio")
    pub name: String,

    /// Endpoint URL (e.g., "http://localhost:9000"); AWS when omitted
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Access key ID; the default credential chain is used when omitted
    #[arg(long, requires = "secret_key")]
    pub access_key: Option<String>,

    /// Secret access key
    #[arg(long, requires = "access_key", env = "S3KV_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Use path-style bucket addressing
    #[arg(long)]
    pub path_style: bool,

    /// Bucket used when a command names none
    #[arg(long)]
    pub bucket: Option<String>,

    /// Prefix prepended to every key
    #[arg(long, default_value = "")]
    pub key_prefix: String,

    /// Also make this the default profile
    #[arg(long)]
    pub default: bool,
}

/// Arguments naming one profile
#[derive(clap::Args, Debug)]
pub struct NameArgs {
    pub name: String,
}

/// Profile information for output (without secrets)
#[derive(Serialize)]
struct ProfileInfo {
    name: String,
    endpoint: Option<String>,
    region: String,
    path_style: bool,
    bucket: Option<String>,
    key_prefix: String,
    default: bool,
}

impl ProfileInfo {
    fn new(profile: &Profile, default: Option<&str>) -> Self {
        Self {
            name: profile.name.clone(),
            endpoint: profile.endpoint.clone(),
            region: profile.region.clone(),
            path_style: profile.path_style,
            bucket: profile.bucket.clone(),
            key_prefix: profile.key_prefix.clone(),
            default: default == Some(profile.name.as_str()),
        }
    }
}

impl From<SetArgs> for Profile {
    fn from(args: SetArgs) -> Self {
        let mut profile = Profile::new(args.name);
        profile.endpoint = args.endpoint;
        profile.access_key = args.access_key;
        profile.secret_key = args.secret_key;
        profile.region = args.region;
        profile.path_style = args.path_style;
        profile.bucket = args.bucket;
        profile.key_prefix = args.key_prefix;
        profile
    }
}

/// Execute a profile subcommand
pub fn execute(cmd: ProfileCommands, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let manager = match ctx.profile_manager() {
        Ok(manager) => manager,
        Err(e) => return formatter.fail("Failed to load configuration", &e),
    };

    match cmd {
        ProfileCommands::Set(args) => execute_set(args, &manager, ctx),
        ProfileCommands::List => execute_list(&manager, ctx),
        ProfileCommands::Remove(args) => match manager.remove(&args.name) {
            Ok(()) => {
                formatter.success(&format!("Profile '{}' removed.", args.name));
                ExitCode::Success
            }
            Err(e) => formatter.fail("Failed to remove profile", &e),
        },
        ProfileCommands::Default(args) => match manager.set_default(&args.name) {
            Ok(()) => {
                formatter.success(&format!("Profile '{}' is now the default.", args.name));
                ExitCode::Success
            }
            Err(e) => formatter.fail("Failed to set default profile", &e),
        },
    }
}

fn execute_set(args: SetArgs, manager: &ProfileManager, ctx: &Context) -> ExitCode {
    let make_default = args.default;
    let profile = Profile::from(args);
    let name = profile.name.clone();

    if let Err(e) = manager.set(profile) {
        return ctx.formatter.fail("Failed to save profile", &e);
    }
    if make_default && let Err(e) = manager.set_default(&name) {
        return ctx.formatter.fail("Failed to set default profile", &e);
    }
    ctx.formatter
        .success(&format!("Profile '{name}' configured successfully."));
    ExitCode::Success
}

fn execute_list(manager: &ProfileManager, ctx: &Context) -> ExitCode {
    let formatter = &ctx.formatter;
    let (profiles, default) = match manager.list().and_then(|p| Ok((p, manager.default_name()?))) {
        Ok(listing) => listing,
        Err(e) => return formatter.fail("Failed to list profiles", &e),
    };
    let infos: Vec<ProfileInfo> = profiles
        .iter()
        .map(|p| ProfileInfo::new(p, default.as_deref()))
        .collect();

    if formatter.is_json() {
        formatter.json(&infos);
    } else if infos.is_empty() {
        formatter.println("No profiles configured.");
    } else {
        let rows = infos
            .into_iter()
            .map(|info| {
                vec![
                    if info.default { format!("{} *", info.name) } else { info.name },
                    info.endpoint.unwrap_or_else(|| "(aws)".to_string()),
                    info.region,
                    info.bucket.unwrap_or_default(),
                    info.key_prefix,
                ]
            })
            .collect();
        formatter.table(&["NAME", "ENDPOINT", "REGION", "BUCKET", "KEY PREFIX"], rows);
    }
    ExitCode::Success
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::commands::{Cli, Commands};

    #[test]
    fn test_set_args_into_profile() {
        let cli = Cli::parse_from([
            "s3kv",
            "profile",
            "set",
            "local",
            "--endpoint",
            "http://localhost:9000",
            "--access-key",
            "minioadmin",
            "--secret-key",
            "minioadmin",
            "--path-style",
            "--bucket",
            "records",
        ]);
        let Commands::Profile(ProfileCommands::Set(args)) = cli.command else {
            panic!("expected profile set");
        };
        let profile = Profile::from(args);

        assert_eq!(profile.region, "us-east-1");
        assert!(profile.path_style);
        assert_eq!(profile.bucket.as_deref(), Some("records"));
        profile.validate().unwrap();
    }

    #[test]
    fn test_profile_info_hides_secrets() {
        let mut profile = Profile::new("aws");
        profile.secret_key = Some("hunter2".into());
        let json = serde_json::to_string(&ProfileInfo::new(&profile, Some("aws"))).unwrap();

        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"default\":true"));
    }
}
