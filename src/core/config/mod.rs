use std::path::{Path, PathBuf};

use chrono::{FixedOffset, Offset, Utc};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "leadserver.toml";
pub const CONFIG_PATH_ENV: &str = "LEADSERVER_CONFIG";
pub const ENV_PREFIX: &str = "LEADSERVER_";

/// Hard ceiling on list page sizes regardless of configuration.
pub const PAGE_SIZE_CEILING: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub engagement: EngagementConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub connect_timeout_secs: u64,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/leadserver".to_string(),
            pool_size: 10,
            connect_timeout_secs: 5,
            run_migrations: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    /// Offset of the reporting time zone from UTC; call dates are bucketed by
    /// calendar day in this zone.
    pub reference_utc_offset_minutes: i32,
    /// Per-telecaller cap on calls recorded per calendar day.
    pub daily_call_limit: Option<i32>,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            reference_utc_offset_minutes: 330,
            daily_call_limit: None,
            default_page_size: 25,
            max_page_size: PAGE_SIZE_CEILING,
        }
    }
}

fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    minutes.checked_mul(60).and_then(FixedOffset::east_opt)
}

impl EngagementConfig {
    pub fn reference_offset(&self) -> FixedOffset {
        offset_from_minutes(self.reference_utc_offset_minutes).unwrap_or_else(|| Utc.fix())
    }

    pub fn page_limit(&self, requested: Option<i64>) -> i64 {
        let max = self.max_page_size.clamp(1, PAGE_SIZE_CEILING);
        requested.unwrap_or(self.default_page_size).clamp(1, max)
    }
}

impl AppConfig {
    /// Defaults, then the TOML file, then `DATABASE_URL`, then `LEADSERVER_*`
    /// variables (nested keys separated by `__`).
    pub fn figment(config_path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_path))
            .merge(
                Env::raw()
                    .only(&["DATABASE_URL"])
                    .map(|_| "database.url".into()),
            )
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn config_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(&Self::config_path()))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let offset = self.engagement.reference_utc_offset_minutes;
        if offset_from_minutes(offset).is_none() {
            return Err(ConfigError::Invalid(format!(
                "engagement.reference_utc_offset_minutes out of range: {offset}"
            )));
        }
        if let Some(limit) = self.engagement.daily_call_limit {
            if limit < 1 {
                return Err(ConfigError::Invalid(format!(
                    "engagement.daily_call_limit must be positive, got {limit}"
                )));
            }
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url is empty".to_string()));
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "database.pool_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engagement.reference_utc_offset_minutes, 330);
        assert_eq!(config.engagement.max_page_size, 100);
        assert!(config.engagement.daily_call_limit.is_none());
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 9191\n\n[engagement]\nreference_utc_offset_minutes = 0\ndaily_call_limit = 150\n"
        )
        .unwrap();

        let config = AppConfig::from_figment(AppConfig::figment(file.path())).unwrap();
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.engagement.reference_utc_offset_minutes, 0);
        assert_eq!(config.engagement.daily_call_limit, Some(150));
        assert_eq!(config.engagement.default_page_size, 25);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            AppConfig::from_figment(AppConfig::figment(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.server.port, ServerConfig::default().port);
    }

    #[test]
    fn test_rejects_non_positive_call_limit() {
        let mut config = AppConfig::default();
        config.engagement.daily_call_limit = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_out_of_range_offset() {
        let mut config = AppConfig::default();
        config.engagement.reference_utc_offset_minutes = 24 * 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overflowing_offset_is_rejected_not_panicking() {
        let mut config = AppConfig::default();
        config.engagement.reference_utc_offset_minutes = i32::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.engagement.reference_offset(), Utc.fix());
    }

    #[test]
    fn test_page_limit_is_capped() {
        let engagement = EngagementConfig {
            max_page_size: 500,
            ..EngagementConfig::default()
        };
        assert_eq!(engagement.page_limit(Some(1000)), 100);
        assert_eq!(engagement.page_limit(Some(0)), 1);
        assert_eq!(engagement.page_limit(None), 25);
    }

    #[test]
    fn test_reference_offset() {
        let engagement = EngagementConfig::default();
        assert_eq!(engagement.reference_offset().local_minus_utc(), 330 * 60);
    }
}
