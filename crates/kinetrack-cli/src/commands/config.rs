//! Config command implementation
//!
//! Prints the default tracker configuration, or validates a configuration
//! file and prints it with defaults filled in.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::TrackerConfig;

/// Run the config command
///
/// # Arguments
/// * `check` - Optional configuration file to validate
///
/// # Returns
/// Exit code: 0 on success, 1 on error
pub fn run(check: Option<&str>) -> Result<ExitCode> {
    let config = match check {
        Some(path) => {
            let config = TrackerConfig::load(Path::new(path))
                .with_context(|| format!("Invalid config: {}", path))?;
            eprintln!("{} {}", "Valid:".green().bold(), path);
            config
        }
        None => TrackerConfig::default(),
    };
    let json = render(&config)?;
    println!("{}", json);
    Ok(ExitCode::SUCCESS)
}

/// Pretty JSON for a configuration.
pub fn render(config: &TrackerConfig) -> Result<String> {
    serde_json::to_string_pretty(config).context("Failed to serialize config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_render_reloads() {
        let json = render(&TrackerConfig::default()).unwrap();
        let back: TrackerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TrackerConfig::default());
        assert!(json.contains("\"lookahead\""));
        assert!(!json.contains("\"kalman\""));
    }
}
