//! Object and file filters
//!
//! A [`Filter`] is the conjunction of every criterion that was set: basename
//! regex, path include/exclude regexes, age bounds, size bounds and an
//! optional caller predicate. Remote listings and local scans share it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use jiff::tz::TimeZone;
use jiff::{Span, Timestamp};
use regex::Regex;

use crate::error::{Error, Result};
use crate::local::LocalFile;
use crate::traits::ObjectDescriptor;

/// What a filter gets to look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttrs<'a> {
    /// Key (remote) or path relative to the scan root (local), `/`-separated
    pub path: &'a str,
    pub size: u64,
    /// Epoch seconds
    pub mtime: i64,
}

impl<'a> FileAttrs<'a> {
    pub fn basename(&self) -> &'a str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(self.path)
    }
}

impl<'a> From<&'a ObjectDescriptor> for FileAttrs<'a> {
    fn from(item: &'a ObjectDescriptor) -> Self {
        Self {
            path: &item.key,
            size: item.size,
            mtime: item.mtime,
        }
    }
}

impl<'a> From<&'a LocalFile> for FileAttrs<'a> {
    fn from(file: &'a LocalFile) -> Self {
        Self {
            path: &file.rel_path,
            size: file.size,
            mtime: file.mtime,
        }
    }
}

/// Caller-supplied filter function
pub type Predicate = Arc<dyn Fn(&FileAttrs<'_>) -> bool + Send + Sync>;

/// Compiled filter
#[derive(Clone, Default)]
pub struct Filter {
    filespec: Option<Regex>,
    include: Option<Regex>,
    exclude: Option<Regex>,
    newer_than: Option<i64>,
    larger: Option<u64>,
    smaller: Option<u64>,
    predicate: Option<Predicate>,
}

impl Filter {
    /// Filter accepting everything
    pub fn all() -> Self {
        Self::default()
    }

    pub fn builder() -> FilterBuilder {
        FilterBuilder::default()
    }

    /// Whether the item passes every configured criterion
    pub fn matches(&self, attrs: &FileAttrs<'_>) -> bool {
        if let Some(re) = &self.filespec
            && !re.is_match(attrs.basename())
        {
            return false;
        }
        if let Some(re) = &self.include
            && !re.is_match(attrs.path)
        {
            return false;
        }
        if let Some(re) = &self.exclude
            && re.is_match(attrs.path)
        {
            return false;
        }
        if let Some(cutoff) = self.newer_than
            && attrs.mtime < cutoff
        {
            return false;
        }
        if let Some(min) = self.larger
            && attrs.size < min
        {
            return false;
        }
        if let Some(max) = self.smaller
            && attrs.size > max
        {
            return false;
        }
        match &self.predicate {
            Some(predicate) => predicate(attrs),
            None => true,
        }
    }

    pub fn matches_object(&self, item: &ObjectDescriptor) -> bool {
        self.matches(&item.into())
    }

    pub fn matches_file(&self, file: &LocalFile) -> bool {
        self.matches(&file.into())
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("filespec", &self.filespec.as_ref().map(Regex::as_str))
            .field("include", &self.include.as_ref().map(Regex::as_str))
            .field("exclude", &self.exclude.as_ref().map(Regex::as_str))
            .field("newer_than", &self.newer_than)
            .field("larger", &self.larger)
            .field("smaller", &self.smaller)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Builder for [`Filter`]
#[derive(Default)]
pub struct FilterBuilder {
    filespec: Option<String>,
    include: Option<String>,
    exclude: Option<String>,
    older: Option<AgeBound>,
    newer: Option<AgeBound>,
    larger: Option<u64>,
    smaller: Option<u64>,
    predicate: Option<Predicate>,
}

impl FilterBuilder {
    /// Regex matched against the basename only
    pub fn filespec(mut self, pattern: impl Into<String>) -> Self {
        self.filespec = Some(pattern.into());
        self
    }

    /// Regex the full key must match
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include = Some(pattern.into());
        self
    }

    /// Regex the full key must not match
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude = Some(pattern.into());
        self
    }

    /// Keep only items last modified strictly before the bound
    pub fn older(mut self, bound: AgeBound) -> Self {
        self.older = Some(bound);
        self
    }

    /// Keep only items last modified at or after the bound
    pub fn newer(mut self, bound: AgeBound) -> Self {
        self.newer = Some(bound);
        self
    }

    /// Minimum size in bytes, inclusive
    pub fn larger(mut self, bytes: u64) -> Self {
        self.larger = Some(bytes);
        self
    }

    /// Maximum size in bytes, inclusive
    pub fn smaller(mut self, bytes: u64) -> Self {
        self.smaller = Some(bytes);
        self
    }

    /// Custom filter function; cannot be combined with [`Self::older`]
    pub fn predicate(mut self, predicate: impl Fn(&FileAttrs<'_>) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn build(self) -> Result<Filter> {
        self.build_at(Timestamp::now().as_second())
    }

    /// Build with age bounds resolved against `now` (epoch seconds)
    pub fn build_at(self, now: i64) -> Result<Filter> {
        let predicate = match (self.older, self.predicate) {
            (Some(_), Some(_)) => {
                return Err(Error::InvalidArgument(
                    "a custom filter and an 'older' bound cannot be combined".into(),
                ));
            }
            (Some(bound), None) => {
                let cutoff = bound.cutoff(now)?;
                Some(Arc::new(move |attrs: &FileAttrs<'_>| attrs.mtime < cutoff) as Predicate)
            }
            (None, predicate) => predicate,
        };

        if let (Some(min), Some(max)) = (self.larger, self.smaller)
            && min > max
        {
            return Err(Error::InvalidArgument(format!(
                "size bounds are empty: larger {min} > smaller {max}"
            )));
        }

        Ok(Filter {
            filespec: compile(self.filespec, "filespec")?,
            include: compile(self.include, "include")?,
            exclude: compile(self.exclude, "exclude")?,
            newer_than: self.newer.map(|bound| bound.cutoff(now)).transpose()?,
            larger: self.larger,
            smaller: self.smaller,
            predicate,
        })
    }
}

fn compile(pattern: Option<String>, what: &str) -> Result<Option<Regex>> {
    pattern
        .map(|p| {
            Regex::new(&p).map_err(|e| Error::InvalidArgument(format!("invalid {what} regex: {e}")))
        })
        .transpose()
}

/// Age bound: either a duration before now or an absolute instant
#[derive(Debug, Clone, Copy)]
pub enum AgeBound {
    /// Calendar span before now, resolved in UTC
    Ago(Span),
    /// Absolute epoch seconds
    At(i64),
}

impl AgeBound {
    /// Cutoff instant in epoch seconds
    pub fn cutoff(&self, now: i64) -> Result<i64> {
        match *self {
            AgeBound::Ago(span) => {
                let cutoff = Timestamp::from_second(now)
                    .and_then(|ts| ts.to_zoned(TimeZone::UTC).checked_sub(span))
                    .map_err(|e| Error::InvalidArgument(format!("age out of range: {e}")))?;
                Ok(cutoff.timestamp().as_second())
            }
            AgeBound::At(at) => Ok(at),
        }
    }
}

impl PartialEq for AgeBound {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AgeBound::Ago(a), AgeBound::Ago(b)) => a.fieldwise() == b.fieldwise(),
            (AgeBound::At(a), AgeBound::At(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AgeBound {}

impl FromStr for AgeBound {
    type Err = Error;

    /// Accepts an RFC 3339 timestamp, a civil date (`2024-01-31`, UTC), a
    /// span such as `7d`, `1h 30m`, `2w`, `3mo`, `1y` or `P1D`, or a bare
    /// number of seconds
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = |detail: String| Error::InvalidArgument(format!("invalid age '{s}': {detail}"));

        if let Ok(ts) = s.parse::<Timestamp>() {
            return Ok(AgeBound::At(ts.as_second()));
        }
        if let Ok(date) = s.parse::<jiff::civil::Date>() {
            let zoned = date.to_zoned(TimeZone::UTC).map_err(|e| invalid(e.to_string()))?;
            return Ok(AgeBound::At(zoned.timestamp().as_second()));
        }
        let span = match s.parse::<i64>() {
            Ok(secs) => Span::new().try_seconds(secs),
            Err(_) => s.parse::<Span>(),
        }
        .map_err(|e| invalid(e.to_string()))?;
        if span.is_negative() {
            return Err(invalid("must not be negative".into()));
        }
        Ok(AgeBound::Ago(span))
    }
}

/// Parse a size such as `512`, `10K`, `1.5MB` or `2GiB` (1024-based)
pub fn parse_size(input: &str) -> Result<u64> {
    let invalid = || Error::InvalidArgument(format!("invalid size '{input}'"));
    let s = input.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number: f64 = number.parse().map_err(|_| invalid())?;

    let scale: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        _ => return Err(invalid()),
    };
    let bytes = number * scale as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(bytes.round() as u64)
}
