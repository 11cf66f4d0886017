//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SWCACHE_*)
//! 2. TOML config file (if SWCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SWCACHE_*)
/// 2. TOML config file (if SWCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name of the live cache store. Bumping it invalidates every prior store on activation.
    ///
    /// Set via SWCACHE_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Origin the worker controls; precache paths are resolved against it.
    ///
    /// Set via SWCACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Paths fetched and stored during install.
    ///
    /// Set via SWCACHE_PRECACHE environment variable (comma-separated).
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Path to SQLite cache database.
    ///
    /// Set via SWCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Staleness threshold for images, in days.
    #[serde(default = "default_image_max_age_days")]
    pub image_max_age_days: u64,

    /// Staleness threshold for fonts, in days.
    #[serde(default = "default_font_max_age_days")]
    pub font_max_age_days: u64,

    /// Request the waiting period be skipped as soon as install completes.
    #[serde(default = "default_true")]
    pub skip_waiting_on_install: bool,

    /// Serialize concurrent cache-first requests for the same resource.
    #[serde(default)]
    pub coalesce_inflight: bool,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via SWCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Transport timeout in milliseconds.
    ///
    /// Set via SWCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_cache_version() -> String {
    "app-v1".into()
}

fn default_origin() -> String {
    "http://localhost:5000".into()
}

fn default_precache() -> Vec<String> {
    vec!["/".into(), "/index.html".into(), "/manifest.json".into()]
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./swcache.sqlite")
}

fn default_image_max_age_days() -> u64 {
    30
}

fn default_font_max_age_days() -> u64 {
    6 * 30
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    "swcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_version: default_cache_version(),
            origin: default_origin(),
            precache: default_precache(),
            db_path: default_db_path(),
            image_max_age_days: default_image_max_age_days(),
            font_max_age_days: default_font_max_age_days(),
            skip_waiting_on_install: true,
            coalesce_inflight: false,
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn image_max_age(&self) -> Duration {
        Duration::from_millis(self.image_max_age_days.saturating_mul(DAY_MS))
    }

    pub fn font_max_age(&self) -> Duration {
        Duration::from_millis(self.font_max_age_days.saturating_mul(DAY_MS))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SWCACHE_`
    /// 2. TOML file from `SWCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SWCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SWCACHE_")
                .ignore(&["CONFIG_FILE", "PRECACHE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let mut config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        if let Ok(paths) = std::env::var("SWCACHE_PRECACHE") {
            config.precache = paths
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.cache_version, "app-v1");
        assert_eq!(config.precache, vec!["/", "/index.html", "/manifest.json"]);
        assert_eq!(config.db_path, PathBuf::from("./swcache.sqlite"));
        assert_eq!(config.image_max_age_days, 30);
        assert_eq!(config.font_max_age_days, 180);
        assert!(config.skip_waiting_on_install);
        assert!(!config.coalesce_inflight);
        assert_eq!(config.user_agent, "swcache/0.1");
    }

    #[test]
    fn test_thresholds() {
        let config = AppConfig::default();
        assert_eq!(config.image_max_age(), Duration::from_secs(30 * 24 * 60 * 60));
        assert_eq!(config.font_max_age(), Duration::from_secs(180 * 24 * 60 * 60));
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_thresholds_saturate() {
        let config = AppConfig { image_max_age_days: u64::MAX, font_max_age_days: u64::MAX, ..Default::default() };
        assert_eq!(config.image_max_age(), Duration::from_millis(u64::MAX));
        assert_eq!(config.font_max_age(), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_load_layers_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "swcache.toml",
                r#"
                cache_version = "app-v2"
                image_max_age_days = 7
                "#,
            )?;
            jail.set_env("SWCACHE_CONFIG_FILE", "swcache.toml");
            jail.set_env("SWCACHE_CACHE_VERSION", "app-v3");
            jail.set_env("SWCACHE_PRECACHE", "/, /app.js");

            let config = AppConfig::load().expect("config should load");
            assert_eq!(config.cache_version, "app-v3");
            assert_eq!(config.image_max_age_days, 7);
            assert_eq!(config.precache, vec!["/", "/app.js"]);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SWCACHE_TIMEOUT_MS", "10");
            assert!(matches!(AppConfig::load(), Err(ConfigError::Invalid { .. })));
            Ok(())
        });
    }
}
