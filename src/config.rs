use crate::sync::activity::DEFAULT_LOG_CAPACITY;
use crate::sync::cache::DEFAULT_TTL;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// 后端程序，调用方式: `<program> <args...> <command> [manager]`
    pub program: String,
    pub args: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            program: "package-sync".to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache_ttl_ms: u64,
    pub log_capacity: usize,
    pub backend: BackendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_ms: DEFAULT_TTL.as_millis() as u64,
            log_capacity: DEFAULT_LOG_CAPACITY,
            backend: BackendConfig::default(),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".config/pkgsync/config.toml")
    }

    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}
