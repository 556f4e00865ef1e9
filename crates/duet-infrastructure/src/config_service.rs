//! Configuration service implementation.
//!
//! Loads the application configuration from `config.toml`, writing a default
//! file on first run, and applies `DUET_*` environment overrides on top.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use duet_core::config::AppConfig;
use duet_core::error::Result;

use crate::paths::DuetPaths;
use crate::storage::AtomicFile;

pub const ENV_GATEWAY_URL: &str = "DUET_GATEWAY_URL";
pub const ENV_PROVIDER: &str = "DUET_PROVIDER";
pub const ENV_TRUST_SERVER_URL: &str = "DUET_TRUST_SERVER_URL";
pub const ENV_HISTORY_LIMIT: &str = "DUET_HISTORY_LIMIT";

/// Configuration service that loads and caches the application configuration.
#[derive(Clone)]
pub struct ConfigService {
    file: AtomicFile<AppConfig>,
    /// Cached configuration, populated on first successful load.
    config: Arc<RwLock<Option<AppConfig>>>,
}

impl ConfigService {
    pub fn new(paths: &DuetPaths) -> Self {
        Self::with_path(paths.config_file())
    }

    /// Uses an explicit file (`--config`, tests).
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            file: AtomicFile::toml(path),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets the configuration, loading from file if not cached.
    ///
    /// Environment overrides are applied every time the file is read, so they
    /// never end up persisted.
    pub fn get_config(&self) -> Result<AppConfig> {
        if let Ok(read_lock) = self.config.read() {
            if let Some(ref cached) = *read_lock {
                return Ok(cached.clone());
            }
        }

        let mut loaded = self.load_or_create()?;
        apply_env_overrides(&mut loaded, |key| std::env::var(key).ok());

        if let Ok(mut write_lock) = self.config.write() {
            *write_lock = Some(loaded.clone());
        }
        Ok(loaded)
    }

    fn load_or_create(&self) -> Result<AppConfig> {
        match self.file.load()? {
            Some(config) => Ok(config),
            None => {
                let default_config = AppConfig::default();
                self.file.save(&default_config)?;
                tracing::info!(
                    "[Config] Wrote default configuration to {}",
                    self.file.path().display()
                );
                Ok(default_config)
            }
        }
    }
}

/// Applies `DUET_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(url) = non_empty(ENV_GATEWAY_URL) {
        config.gateway.base_url = url;
    }
    if let Some(provider) = non_empty(ENV_PROVIDER) {
        config.gateway.provider = provider;
    }
    if let Some(url) = non_empty(ENV_TRUST_SERVER_URL) {
        config.speech.trust_server_url = Some(url);
    }
    if let Some(limit) = non_empty(ENV_HISTORY_LIMIT) {
        match limit.trim().parse::<usize>() {
            Ok(limit) => config.history.context_limit = limit,
            Err(_) => tracing::warn!(
                "[Config] Ignoring {}={:?}: not a non-negative integer",
                ENV_HISTORY_LIMIT,
                limit
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_first_load_writes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let service = ConfigService::with_path(path.clone());

        let config = service.load_or_create().unwrap();

        assert_eq!(config, AppConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_PROVIDER, "deepseek"),
            (ENV_HISTORY_LIMIT, "4"),
            (ENV_GATEWAY_URL, "  "),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.gateway.provider, "deepseek");
        assert_eq!(config.history.context_limit, 4);
        // blank values are ignored
        assert_eq!(config.gateway.base_url, AppConfig::default().gateway.base_url);
    }

    #[test]
    fn test_invalid_history_limit_is_ignored() {
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |key| {
            (key == ENV_HISTORY_LIMIT).then(|| "many".to_string())
        });

        assert_eq!(config.history.context_limit, 10);
    }
}
