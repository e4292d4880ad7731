use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use library::{
    CacheConfig, IndexerOptions, WatchOptions, DEFAULT_CONCURRENCY, DEFAULT_STABILITY,
    DEFAULT_WATCH_DEPTH,
};
use metadata::{DEFAULT_MAX_ENTRIES, DEFAULT_SAVE_DELAY};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CACHE_PATH: &str = "cache/metadata-store.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Used when a request carries no `dir`.
    pub library_root: String,
    pub cache_path: String,
    pub cache_max_entries: usize,
    pub cache_save_delay_ms: u64,
    pub scan_concurrency: usize,
    pub watch_enabled: bool,
    pub watch_depth: usize,
    pub watch_stability_ms: u64,
    /// 0 walks the whole tree.
    pub max_walk_depth: usize,
    pub debug_perf: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            library_root: String::new(),
            cache_path: DEFAULT_CACHE_PATH.to_string(),
            cache_max_entries: DEFAULT_MAX_ENTRIES,
            cache_save_delay_ms: DEFAULT_SAVE_DELAY.as_millis() as u64,
            scan_concurrency: DEFAULT_CONCURRENCY,
            watch_enabled: true,
            watch_depth: DEFAULT_WATCH_DEPTH,
            watch_stability_ms: DEFAULT_STABILITY.as_millis() as u64,
            max_walk_depth: 0,
            debug_perf: false,
        }
    }
}

impl ServerConfig {
    /// Replaces zeroed or blank values with their defaults.
    fn normalize(&mut self) {
        let defaults = ServerConfig::default();
        if self.port == 0 {
            self.port = defaults.port;
        }
        if self.cache_path.trim().is_empty() {
            self.cache_path = defaults.cache_path;
        }
        if self.cache_max_entries == 0 {
            self.cache_max_entries = defaults.cache_max_entries;
        }
        if self.cache_save_delay_ms == 0 {
            self.cache_save_delay_ms = defaults.cache_save_delay_ms;
        }
        if self.scan_concurrency == 0 {
            self.scan_concurrency = defaults.scan_concurrency;
        }
        if self.watch_depth == 0 {
            self.watch_depth = defaults.watch_depth;
        }
        if self.watch_stability_ms == 0 {
            self.watch_stability_ms = defaults.watch_stability_ms;
        }
    }

    pub fn cache_config(&self, config_path: &Path) -> CacheConfig {
        CacheConfig {
            store_path: Some(resolve_path(config_path, &self.cache_path)),
            max_entries: self.cache_max_entries,
            save_delay: Duration::from_millis(self.cache_save_delay_ms),
        }
    }

    pub fn indexer_options(&self) -> IndexerOptions {
        IndexerOptions {
            concurrency: self.scan_concurrency,
            watch: WatchOptions {
                enabled: self.watch_enabled,
                max_depth: self.watch_depth,
                stability: Duration::from_millis(self.watch_stability_ms),
            },
            max_walk_depth: (self.max_walk_depth > 0).then_some(self.max_walk_depth),
            debug_perf: self.debug_perf,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("TUBESHELF_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

/// Loads `path`, or writes a default config there. The flag is true when created.
pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = if contents.trim().is_empty() {
            ServerConfig::default()
        } else {
            serde_yaml::from_str(&contents)?
        };
        config.normalize();
        return Ok((config, false));
    }

    let config = ServerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

pub fn resolve_library_root(config_path: &Path, value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(resolve_path(config_path, trimmed))
    }
}
