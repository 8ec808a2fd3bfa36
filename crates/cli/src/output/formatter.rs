//! Human and JSON output
//!
//! Results go to stdout, diagnostics to stderr. In JSON mode stdout only
//! ever carries JSON documents.

use console::style;
use serde::Serialize;

use s3kv_core::Error;

use super::OutputConfig;
use crate::exit_code::ExitCode;

#[derive(Debug, Clone)]
pub struct Formatter {
    config: OutputConfig,
}

impl Formatter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn is_json(&self) -> bool {
        self.config.json
    }

    fn colors_enabled(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    /// Confirmation line; silent in quiet and JSON modes
    pub fn success(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        if self.colors_enabled() {
            println!("{} {message}", style("✓").green());
        } else {
            println!("✓ {message}");
        }
    }

    /// Error line on stderr, printed even in quiet mode
    pub fn error(&self, message: &str) {
        if self.config.json {
            let error = serde_json::json!({ "error": message });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&error).unwrap_or_else(|_| message.to_string())
            );
        } else if self.colors_enabled() {
            eprintln!("{} {message}", style("✗").red());
        } else {
            eprintln!("✗ {message}");
        }
    }

    /// Report a failed operation and pick its exit code
    pub fn fail(&self, context: &str, err: &Error) -> ExitCode {
        self.error(&format!("{context}: {err}"));
        ExitCode::from(err)
    }

    /// Pretty-printed JSON document on stdout
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing output: {e}"),
        }
    }

    pub fn println(&self, message: &str) {
        if !self.config.quiet {
            println!("{message}");
        }
    }

    /// Borderless table with a header row
    pub fn table(&self, header: &[&str], rows: Vec<Vec<String>>) {
        if self.config.quiet {
            return;
        }
        let mut table = comfy_table::Table::new();
        table
            .load_preset(comfy_table::presets::NOTHING)
            .set_header(header.iter().copied())
            .add_rows(rows);
        println!("{table}");
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}

/// Epoch seconds as a UTC timestamp
pub fn format_mtime(mtime: i64) -> String {
    jiff::Timestamp::from_second(mtime)
        .map(|ts| ts.strftime("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| "-".to_string())
}

pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colors_follow_mode() {
        assert!(Formatter::default().colors_enabled());

        let json = Formatter::new(OutputConfig {
            json: true,
            ..Default::default()
        });
        assert!(json.is_json());
        assert!(!json.colors_enabled());

        let plain = Formatter::new(OutputConfig {
            no_color: true,
            ..Default::default()
        });
        assert!(!plain.colors_enabled());
    }

    #[test]
    fn test_fail_maps_exit_code() {
        let formatter = Formatter::new(OutputConfig {
            quiet: true,
            ..Default::default()
        });
        let code = formatter.fail("get", &Error::NotFound("b/k".into()));
        assert_eq!(code, ExitCode::NotFound);

        let code = formatter.fail("put", &Error::InvalidArgument("bad json".into()));
        assert_eq!(code, ExitCode::UsageError);
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_mtime(0), "1970-01-01 00:00:00");
        assert_eq!(format_mtime(86_400 + 61), "1970-01-02 00:01:01");
        assert!(format_size(2048).contains("KiB"));
    }
}
