use crate::engine::PluginSpec;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// RetrySettings
// ---------------------------------------------------------------------------

/// Fixed-count, fixed-backoff retry policy for calls to the Port API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_attempts() -> u32 {
    5
}

fn default_backoff_ms() -> u64 {
    300
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetrySettings {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Optional settings file. Every field has a default, so an empty file (or
/// no file at all) yields the stock plugin pins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Installed into every stack before its configuration is applied.
    #[serde(default = "default_plugins")]
    pub plugins: Vec<PluginSpec>,
    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_plugins() -> Vec<PluginSpec> {
    vec![
        PluginSpec::new("aws", "v5.30.0").regional(),
        PluginSpec::new("civo", "v2.3.3").regional(),
        PluginSpec::new("port", "v0.8.3")
            .with_server("https://github.com/dirien/pulumi-port-labs/releases/download/v0.8.3"),
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            plugins: default_plugins(),
            retry: RetrySettings::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }
}
