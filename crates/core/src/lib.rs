//! s3kv-core: Core library for the s3kv object storage tools
//!
//! This crate provides the SDK-independent engine behind the s3kv CLI:
//! - Paginated listing with name, date and size filters
//! - A single-object transfer primitive with gzip and progress reporting
//! - A bounded concurrency driver for multi-object operations
//! - JSON records with dot-path updates and a read-through cache
//! - Configuration and store profiles
//!
//! Storage is reached through the [`ObjectStore`] trait, so everything here
//! can run against [`MemoryStore`] in tests.

pub mod bulk;
pub mod cache;
pub mod client;
pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
pub mod instrumented;
pub mod jsonpath;
pub mod lister;
pub mod local;
pub mod memory;
pub mod path;
pub mod perf;
pub mod profile;
pub mod progress;
pub mod traits;
pub mod transfer;

pub use bulk::BulkOptions;
pub use cache::{Clock, ManualClock, ReadCache, SystemClock};
pub use client::{Client, ClientBuilder, GrepMatch};
pub use codec::{JsonCodec, Record, RecordMeta};
pub use config::{CacheConfig, Config, ConfigManager};
pub use driver::{ProgressAggregator, RunSummary};
pub use error::{Error, Result};
pub use filter::{AgeBound, FileAttrs, Filter, FilterBuilder, parse_size};
pub use instrumented::InstrumentedStore;
pub use jsonpath::Update;
pub use lister::{FolderListing, ListSpec, Lister, Pager};
pub use local::LocalFile;
pub use memory::MemoryStore;
pub use path::{KeyPrefix, Location, S3Url, join_key, parse_location, parse_remote};
pub use perf::{OpKind, OpStats, PerfStats, PerfTracker};
pub use profile::{Profile, ProfileManager};
pub use progress::{ProgressFn, ProgressState};
pub use traits::{
    Body, BucketInfo, GetOutput, ListPage, ListRequest, ListingResult, ObjectDescriptor, ObjectMeta, ObjectReader,
    ObjectStore, PutOptions,
};
pub use transfer::{Compression, GetOptions, Transfer, UploadOptions, gzip, is_gzip_key};
