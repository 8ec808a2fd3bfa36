//! CLI command definitions and execution
//!
//! Every command parses its locations, asks the [`Context`] for a client
//! and reports through the shared [`Formatter`].

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use s3kv_core::{
    AgeBound, Client, ConfigManager, Error, Filter, ListSpec, ObjectStore, Profile, ProfileManager, ReadCache, Result,
    parse_remote, parse_size,
};
use s3kv_s3::S3Store;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod buckets;
mod cat;
mod completions;
pub mod cp;
mod get;
mod grep;
mod head;
mod ls;
mod mv;
mod pipe;
mod profile;
mod put;
mod rm;
mod update;

/// s3kv - object storage as a JSON key/value store and bulk transfer tool
///
/// Works against AWS S3 and other S3-compatible backends.
#[derive(Parser, Debug)]
#[command(name = "s3kv")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bar
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    /// Store profile to use instead of the default one
    #[arg(long, global = true, env = "S3KV_PROFILE")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage store profiles
    #[command(subcommand)]
    Profile(profile::ProfileCommands),

    /// List buckets
    Buckets(buckets::BucketsArgs),

    /// List objects under a prefix
    Ls(ls::LsArgs),

    /// Print a JSON record
    Get(get::GetArgs),

    /// Store a JSON record
    Put(put::PutArgs),

    /// Edit a JSON record by dot paths
    Update(update::UpdateArgs),

    /// Show object metadata
    Head(head::HeadArgs),

    /// Stream an object to stdout
    Cat(cat::CatArgs),

    /// Stream stdin to an object
    Pipe(pipe::PipeArgs),

    /// Copy objects (local<->S3, S3<->S3)
    Cp(cp::CpArgs),

    /// Move objects between S3 locations (copy + delete source)
    Mv(mv::MvArgs),

    /// Remove objects
    Rm(rm::RmArgs),

    /// Search object contents line by line
    Grep(grep::GrepArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Per-invocation state shared by the commands
pub struct Context {
    pub formatter: Formatter,
    profile: Option<String>,
    config_manager: Option<ConfigManager>,
}

impl Context {
    pub fn new(formatter: Formatter, profile: Option<String>) -> Self {
        Self {
            formatter,
            profile,
            config_manager: None,
        }
    }

    /// Read configuration from `manager` instead of the default location
    pub fn with_config_manager(mut self, manager: ConfigManager) -> Self {
        self.config_manager = Some(manager);
        self
    }

    fn config_manager(&self) -> Result<ConfigManager> {
        match &self.config_manager {
            Some(manager) => Ok(ConfigManager::with_path(manager.config_path().to_path_buf())),
            None => ConfigManager::new(),
        }
    }

    pub fn profile_manager(&self) -> Result<ProfileManager> {
        Ok(ProfileManager::with_config_manager(self.config_manager()?))
    }

    /// The profile named on the command line, else the configured default,
    /// else the only profile
    fn resolve_profile(&self) -> Result<(Profile, s3kv_core::Config)> {
        let config = self.config_manager()?.load()?;
        let name = match self.profile.clone().or_else(|| config.defaults.profile.clone()) {
            Some(name) => name,
            None => match config.profiles.as_slice() {
                [only] => only.name.clone(),
                [] => {
                    return Err(Error::Config(
                        "no profile configured; run `s3kv profile set`".into(),
                    ));
                }
                _ => {
                    return Err(Error::Config(
                        "several profiles configured; pass --profile or set a default".into(),
                    ));
                }
            },
        };
        let profile = config
            .profiles
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or(Error::ProfileNotFound(name))?;
        Ok((profile, config))
    }

    /// Store handle for the selected profile
    pub async fn store(&self) -> Result<Arc<dyn ObjectStore>> {
        let (profile, _) = self.resolve_profile()?;
        Ok(Arc::new(S3Store::new(&profile).await?))
    }

    /// Client bound to `bucket`, or to the profile's default bucket
    pub async fn client(&self, bucket: Option<&str>) -> Result<Client> {
        let (profile, config) = self.resolve_profile()?;
        let bucket = bucket
            .map(str::to_string)
            .or_else(|| profile.bucket.clone())
            .ok_or_else(|| Error::InvalidArgument("no bucket given and the profile has no default bucket".into()))?;

        let store = S3Store::new(&profile).await?;
        let mut builder = Client::builder(Arc::new(store))
            .bucket(bucket)
            .key_prefix(profile.key_prefix.clone())
            .concurrency(config.defaults.concurrency);
        if let Some(cache) = ReadCache::from_config(&config.cache)? {
            builder = builder.cache(Arc::new(cache));
        }
        builder.build()
    }
}

/// Split a record argument into an optional bucket and a key
///
/// `s3://bucket/key` names both; anything else is a key in the profile's
/// default bucket.
pub(crate) fn record_target(input: &str) -> Result<(Option<String>, String)> {
    let (bucket, key) = if input.starts_with("s3://") {
        let url = parse_remote(input)?;
        (Some(url.bucket), url.key)
    } else {
        (None, input.to_string())
    };
    if key.is_empty() || key.ends_with('/') {
        return Err(Error::InvalidPath(format!("'{input}' does not name an object")));
    }
    Ok((bucket, key))
}

/// Listing filters shared by ls, cp, mv, rm and grep
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Regex matched against the basename only
    #[arg(long)]
    pub filespec: Option<String>,

    /// Regex the full key must match
    #[arg(long)]
    pub include: Option<String>,

    /// Regex the full key must not match
    #[arg(long)]
    pub exclude: Option<String>,

    /// Only objects modified before this (e.g. 7d, 2024-01-31)
    #[arg(long)]
    pub older: Option<AgeBound>,

    /// Only objects modified at or after this
    #[arg(long)]
    pub newer: Option<AgeBound>,

    /// Only objects of at least this size (e.g. 10K, 1.5MB)
    #[arg(long, value_parser = parse_size_arg)]
    pub larger: Option<u64>,

    /// Only objects of at most this size
    #[arg(long, value_parser = parse_size_arg)]
    pub smaller: Option<u64>,

    /// Keep zero-byte folder markers
    #[arg(long)]
    pub keep_folders: bool,
}

fn parse_size_arg(input: &str) -> std::result::Result<u64, String> {
    parse_size(input).map_err(|e| e.to_string())
}

impl FilterArgs {
    pub fn to_spec(&self) -> Result<ListSpec> {
        let mut builder = Filter::builder();
        if let Some(pattern) = &self.filespec {
            builder = builder.filespec(pattern);
        }
        if let Some(pattern) = &self.include {
            builder = builder.include(pattern);
        }
        if let Some(pattern) = &self.exclude {
            builder = builder.exclude(pattern);
        }
        if let Some(bound) = self.older {
            builder = builder.older(bound);
        }
        if let Some(bound) = self.newer {
            builder = builder.newer(bound);
        }
        if let Some(bytes) = self.larger {
            builder = builder.larger(bytes);
        }
        if let Some(bytes) = self.smaller {
            builder = builder.smaller(bytes);
        }

        Ok(ListSpec {
            filter: builder.build()?,
            keep_folders: self.keep_folders,
            ..Default::default()
        })
    }
}

/// Apply configured defaults underneath the command-line flags
fn output_config(cli: &Cli) -> OutputConfig {
    let defaults = ConfigManager::new()
        .and_then(|manager| manager.load())
        .map(|config| config.defaults)
        .unwrap_or_default();

    OutputConfig {
        json: cli.json || defaults.output == "json",
        no_color: cli.no_color || defaults.color == "never",
        no_progress: cli.no_progress || !defaults.progress,
        quiet: cli.quiet,
    }
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let formatter = Formatter::new(output_config(&cli));
    let ctx = Context::new(formatter, cli.profile);

    match cli.command {
        Commands::Profile(cmd) => profile::execute(cmd, &ctx),
        Commands::Buckets(args) => buckets::execute(args, &ctx).await,
        Commands::Ls(args) => ls::execute(args, &ctx).await,
        Commands::Get(args) => get::execute(args, &ctx).await,
        Commands::Put(args) => put::execute(args, &ctx).await,
        Commands::Update(args) => update::execute(args, &ctx).await,
        Commands::Head(args) => head::execute(args, &ctx).await,
        Commands::Cat(args) => cat::execute(args, &ctx).await,
        Commands::Pipe(args) => pipe::execute(args, &ctx).await,
        Commands::Cp(args) => cp::execute(args, &ctx).await,
        Commands::Mv(args) => mv::execute(args, &ctx).await,
        Commands::Rm(args) => rm::execute(args, &ctx).await,
        Commands::Grep(args) => grep::execute(args, &ctx).await,
        Commands::Completions(args) => completions::execute(args),
    }
}
