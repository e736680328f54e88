//! Application configuration
//!
//! Loaded from an optional TOML file, then overridden from the environment
//! (a `.env` file is read first when present). Every field has a default.

use crate::error::{AppError, Result};
use crate::marketplaces::http::HttpSettings;
use crate::marketplaces::retry::RetryPolicy;
use crate::services::reconciliation_service::DEFAULT_MAX_CHANGE_PERCENT;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitConfig,
    pub reconciliation: ReconciliationConfig,
    pub aggregation: AggregationConfig,
    pub schedule: ScheduleConfig,
    /// `tracing` filter directive, e.g. `marketplace_reconciler=debug`
    pub log: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/reconciler.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Pause between consecutive batch calls to one marketplace
    pub batch_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { batch_delay_ms: 200 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Build and log batches without submitting them
    pub dry_run: bool,
    /// Used for rules without their own max change percent
    pub default_max_change_percent: f64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            default_max_change_percent: DEFAULT_MAX_CHANGE_PERCENT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Days of financial feed re-aggregated on every scheduled run
    pub lookback_days: u32,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self { lookback_days: 7 }
    }
}

/// Daily run time, Moscow time
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub hour: u32,
    pub minute: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { hour: 6, minute: 0 }
    }
}

impl AppConfig {
    /// Load the TOML file (if given) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `RECONCILER_*` overrides read through `lookup`
    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("RECONCILER_DB_PATH").filter(|v| !v.trim().is_empty()) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("RECONCILER_DRY_RUN") {
            self.reconciliation.dry_run = parse_bool(&raw).ok_or_else(|| {
                AppError::Config(format!("RECONCILER_DRY_RUN must be a boolean, got '{}'", raw))
            })?;
        }
        if let Some(filter) = lookup("RECONCILER_LOG").filter(|v| !v.trim().is_empty()) {
            self.log = Some(filter);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.schedule.hour > 23 || self.schedule.minute > 59 {
            return Err(AppError::Config(format!(
                "Invalid schedule time {}:{}",
                self.schedule.hour, self.schedule.minute
            )));
        }
        if self.reconciliation.default_max_change_percent <= 0.0 {
            return Err(AppError::Config(
                "default_max_change_percent must be positive".to_string(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::Config("http.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Settings handed to every marketplace adapter
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.http.timeout_secs),
            retry: self.retry.clone(),
            batch_delay: Duration::from_millis(self.rate_limit.batch_delay_ms),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.rate_limit.batch_delay_ms, 200);
        assert_eq!(config.reconciliation.default_max_change_percent, 25.0);
        assert!(!config.reconciliation.dry_run);

        let settings = config.http_settings();
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(settings.batch_delay, Duration::from_millis(200));
        assert_eq!(settings.retry.max_retries, 3);
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            [database]
            path = "/var/lib/reconciler/db.sqlite"

            [retry]
            max_retries = 5

            [reconciliation]
            dry_run = true

            [schedule]
            hour = 9
            minute = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/var/lib/reconciler/db.sqlite"));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert!(config.reconciliation.dry_run);
        assert_eq!(config.reconciliation.default_max_change_percent, 25.0);
        assert_eq!(config.schedule.hour, 9);
        assert_eq!(config.aggregation.lookback_days, 7);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("RECONCILER_DB_PATH", "/tmp/other.db"),
            ("RECONCILER_DRY_RUN", "yes"),
            ("RECONCILER_LOG", "marketplace_reconciler=debug"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert!(config.reconciliation.dry_run);
        assert_eq!(config.log.as_deref(), Some("marketplace_reconciler=debug"));

        let err = config
            .apply_env(|key| (key == "RECONCILER_DRY_RUN").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.schedule.hour = 24;
        assert!(config.validate().is_err());

        let config = AppConfig::from_toml("[reconciliation]\ndefault_max_change_percent = 0.0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reconciler.toml");
        std::fs::write(&path, "[aggregation]\nlookback_days = 14\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.aggregation.lookback_days, 14);

        let missing = AppConfig::load(Some(&dir.path().join("nope.toml")));
        assert!(matches!(missing, Err(AppError::Io(_))));
    }
}
