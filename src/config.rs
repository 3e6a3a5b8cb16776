use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchtowerError};
use crate::format::TimestampFormat;

const CONFIG_DIR: &str = ".watchtower";
const CONFIG_FILE: &str = "cli.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
    Minimal,
}

/// User settings read from `cli.toml`. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub theme: Theme,
    /// Settled events kept in memory while tailing.
    pub max_events: usize,
    pub timestamp_format: TimestampFormat,
    /// Interpreter used when `tail` is given a bare `.py` script.
    pub default_python: String,
    /// `tracing` filter directive, overridden by `WATCHTOWER_LOG`.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            max_events: 1000,
            timestamp_format: TimestampFormat::Relative,
            default_python: "python3".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// `$WATCHTOWER_CONFIG_DIR`, else `~/.watchtower`.
pub fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("WATCHTOWER_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

impl Config {
    pub fn default_path() -> PathBuf {
        config_dir().join(CONFIG_FILE)
    }

    /// Read the config at `path`; an absent file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&text).map_err(|e| WatchtowerError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = toml::to_string_pretty(self).map_err(|e| WatchtowerError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        fs::write(path, format!("# Watchtower CLI configuration\n\n{body}"))?;
        Ok(())
    }

    /// Write defaults unless a file already exists. Returns whether one was
    /// written.
    pub fn init(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        Self::default().save(path)?;
        Ok(true)
    }
}

/// Lazily loaded config, owned by whoever constructs it.
#[derive(Debug)]
pub struct ConfigCache {
    path: PathBuf,
    cached: Option<Config>,
}

impl ConfigCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path, cached: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&mut self) -> Result<&Config> {
        if self.cached.is_none() {
            self.cached = Some(Config::load(&self.path)?);
        }
        Ok(self.cached.get_or_insert_with(Config::default))
    }

    /// Drop the cached value so the next `get` re-reads the file.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_merges_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cli.toml");
        fs::write(&path, "theme = \"light\"\nmax_events = 50\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.theme, Theme::Light);
        assert_eq!(config.max_events, 50);
        assert_eq!(config.default_python, "python3");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cli.toml");
        fs::write(&path, "theme = \"neon\"").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert_eq!(err.code(), "WT301");
    }

    #[test]
    fn test_init_then_cache_invalidate() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("cli.toml");
        assert!(Config::init(&path).unwrap());
        assert!(!Config::init(&path).unwrap());

        let mut cache = ConfigCache::new(path.clone());
        assert_eq!(cache.get().unwrap().max_events, 1000);

        let mut changed = Config::default();
        changed.max_events = 10;
        changed.save(&path).unwrap();
        assert_eq!(cache.get().unwrap().max_events, 1000);

        cache.invalidate();
        assert_eq!(cache.get().unwrap().max_events, 10);
    }
}
