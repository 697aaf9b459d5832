//! Run configuration: browser flags, protocol timeouts, pass definitions.
//!
//! Loaded from a TOML file; every level has a `Default` so a bare
//! `Config::default()` drives a working run against a locally installed
//! Chromium. Pass definitions are immutable once the run starts.

use crate::error::{Error, Result};
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for one audit run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub protocol: ProtocolConfig,
    pub passes: Vec<PassConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config =
            toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    /// The configured passes, falling back to the default single pass when
    /// the config file declares none.
    pub fn passes(&self) -> Vec<PassConfig> {
        if self.passes.is_empty() {
            vec![PassConfig::default()]
        } else {
            self.passes.clone()
        }
    }
}

/// Browser process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct BrowserConfig {
    /// Path or name of the browser binary.
    pub binary: PathBuf,
    /// Remote debugging port the browser listens on.
    pub port: u16,
    /// Extra flags appended after the built-in set.
    pub flags: Vec<String>,
    /// How long to wait for the debugging endpoint to become reachable.
    pub startup_timeout_ms: u64,
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("chromium"),
            port: 9222,
            flags: Vec::new(),
            startup_timeout_ms: 10_000,
            headless: true,
        }
    }
}

/// Protocol session timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ProtocolConfig {
    /// Default deadline for a single command round-trip.
    pub command_timeout_ms: u64,
    /// Deadline for the page load event after navigation.
    pub load_timeout_ms: u64,
    /// Settle time after the load event before `after_pass` hooks run.
    pub pause_after_load_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 30_000,
            load_timeout_ms: 25_000,
            pause_after_load_ms: 3_000,
        }
    }
}

/// One instrumented navigation/recording cycle and its attached gatherers.
/// Static for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct PassConfig {
    pub name: String,
    /// Record a trace during this pass and store it under the pass name.
    pub record_trace: bool,
    /// Assemble network records from protocol events during this pass.
    pub record_network: bool,
    /// Gatherer names, run in declared order.
    pub gatherers: Vec<String>,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            name: crate::gather::DEFAULT_PASS.to_string(),
            record_trace: true,
            record_network: true,
            gatherers: vec!["url".to_string(), "tags-blocking-first-paint".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_one_working_pass() {
        let config = Config::default();
        let passes = config.passes();
        assert_eq!(passes.len(), 1);
        assert!(passes[0].record_trace);
        assert!(passes[0].record_network);
        assert!(!passes[0].gatherers.is_empty());
    }

    #[test]
    fn config_parses_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [browser]
            binary = "/usr/bin/chromium"
            port = 9333
            headless = false

            [protocol]
            command_timeout_ms = 5000

            [[passes]]
            name = "perf"
            record_trace = true
            record_network = false
            gatherers = ["url"]
            "#,
        )
        .unwrap();

        assert_eq!(config.browser.port, 9333);
        assert!(!config.browser.headless);
        assert_eq!(config.protocol.command_timeout_ms, 5000);
        assert_eq!(config.passes.len(), 1);
        assert_eq!(config.passes[0].name, "perf");
        assert!(!config.passes[0].record_network);
        assert_eq!(config.passes[0].gatherers, vec!["url".to_string()]);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str("[browser]\nport = 1234\n").unwrap();
        assert_eq!(config.browser.port, 1234);
        assert_eq!(config.browser.binary, PathBuf::from("chromium"));
        assert_eq!(config.protocol.load_timeout_ms, 25_000);
        assert_eq!(config.passes().len(), 1);
    }
}
