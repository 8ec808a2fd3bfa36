//! Progress bar utilities for transfer operations
//!
//! Bridges the engine's progress callbacks to an indicatif bar.

use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressStyle;
use s3kv_core::{ProgressFn, ProgressState};

use super::OutputConfig;

const BAR_TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {bytes} ({bytes_per_sec})";

/// Terminal progress for one command, hidden in quiet, JSON and
/// `--no-progress` modes
#[derive(Debug)]
pub struct ProgressBar {
    bar: Option<indicatif::ProgressBar>,
}

impl ProgressBar {
    /// Bar for `total` bytes, a byte spinner when the total is unknown
    pub fn new(config: &OutputConfig, total: Option<u64>) -> Self {
        if config.quiet || config.json || config.no_progress {
            return Self { bar: None };
        }

        let bar = match total {
            Some(total) => {
                let bar = indicatif::ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template(BAR_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                bar
            }
            None => {
                let bar = indicatif::ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template(SPINNER_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            }
        };
        Self { bar: Some(bar) }
    }

    /// Callback feeding this bar, `None` when the bar is hidden
    pub fn callback(&self) -> Option<ProgressFn> {
        let bar = self.bar.clone()?;
        Some(Arc::new(move |state: ProgressState| {
            if let Some(total) = state.total {
                bar.set_length(total);
            }
            bar.set_position(state.loaded);
        }))
    }

    pub fn finish_and_clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.bar.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_quiet_mode() {
        let config = OutputConfig {
            quiet: true,
            ..Default::default()
        };
        let bar = ProgressBar::new(&config, Some(100));
        assert!(!bar.is_visible());
        assert!(bar.callback().is_none());
    }

    #[test]
    fn test_progress_bar_json_mode() {
        let config = OutputConfig {
            json: true,
            ..Default::default()
        };
        assert!(!ProgressBar::new(&config, Some(100)).is_visible());
    }

    #[test]
    fn test_progress_bar_no_progress() {
        let config = OutputConfig {
            no_progress: true,
            ..Default::default()
        };
        assert!(!ProgressBar::new(&config, None).is_visible());
    }

    #[test]
    fn test_callback_moves_bar() {
        let bar = ProgressBar::new(&OutputConfig::default(), None);
        let callback = bar.callback().unwrap();
        callback(ProgressState {
            loaded: 40,
            total: Some(100),
        });
        let inner = bar.bar.as_ref().unwrap();
        assert_eq!(inner.position(), 40);
        assert_eq!(inner.length(), Some(100));
        bar.finish_and_clear();
    }
}
