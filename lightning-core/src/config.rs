//! Configuration for lightning

use crate::LightningError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# Lightning Configuration

[indexing]
# Roots indexed when none are given on the command line
roots = []
# Records per bulk write transaction
batch_size = 500
# Minimum number of new records between progress updates
progress_step = 1000
# Directory names skipped when they sit directly under a root
system_dirs = ["lost+found"]

[search]
# Quiet period after the last keystroke before a lookup runs ("150ms", "1s")
debounce = "150ms"
# Maximum results returned per lookup
result_limit = 500
# Treat queries containing * or ? as glob patterns
glob = true

[ignore]
# Extra glob patterns matched against entry names at any depth.
# Names starting with '.' are always skipped.
patterns = []
"#;

/// Lightning configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ignore: IgnoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default)]
    pub roots: Vec<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_progress_step")]
    pub progress_step: usize,
    #[serde(default = "default_system_dirs")]
    pub system_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_debounce")]
    pub debounce: String,
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
    #[serde(default = "default_glob")]
    pub glob: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IgnoreConfig {
    #[serde(default)]
    pub patterns: Vec<String>,
}

// Default value functions
fn default_batch_size() -> usize {
    500
}
fn default_progress_step() -> usize {
    1000
}
fn default_system_dirs() -> Vec<String> {
    vec!["lost+found".to_string()]
}
fn default_debounce() -> String {
    "150ms".to_string()
}
fn default_result_limit() -> usize {
    500
}
fn default_glob() -> bool {
    true
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            batch_size: default_batch_size(),
            progress_step: default_progress_step(),
            system_dirs: default_system_dirs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
            result_limit: default_result_limit(),
            glob: default_glob(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| LightningError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values serde accepts but the engine cannot use
    fn validate(&self) -> crate::Result<()> {
        if parse_duration(&self.search.debounce).is_none() {
            return Err(LightningError::ConfigParse(format!(
                "invalid search.debounce '{}' (expected a number with ms, s, m, h or d)",
                self.search.debounce
            )));
        }
        Ok(())
    }

    /// Get the debounce window as Duration
    pub fn debounce_duration(&self) -> Duration {
        parse_duration(&self.search.debounce).unwrap_or(Duration::from_millis(150))
    }

    /// Batch size, never below one record
    pub fn batch_size(&self) -> usize {
        self.indexing.batch_size.max(1)
    }
}

/// Parse duration string (e.g., "150ms", "30s", "5m", "1h", "1d")
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num_str, unit) = s.split_at(split);
    let num: u64 = num_str.parse().ok()?;

    let unit_ms: u64 = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => return None,
    };
    num.checked_mul(unit_ms).map(Duration::from_millis)
}
