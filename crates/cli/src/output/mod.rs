//! Terminal output: formatted results and transfer progress

mod formatter;
mod progress;

pub use formatter::{Formatter, format_mtime, format_size};
pub use progress::ProgressBar;

/// Output switches merged from flags and configured defaults
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    pub json: bool,
    pub no_color: bool,
    pub no_progress: bool,
    /// Suppress everything but errors and requested data
    pub quiet: bool,
}
