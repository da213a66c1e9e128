// lib/src/config.rs

use std::path::Path;

use serde::Deserialize;

use models::{BillingError, BillingResult};

use crate::stores::StoreConfig;

/// Scheduler knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between batch passes.
    pub tick_interval_secs: u64,
    /// Pause between consecutive rules inside a pass, so the storage
    /// backend does not see the whole batch at once.
    pub inter_rule_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            tick_interval_secs: 86_400,
            inter_rule_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    pub storage: StoreConfig,
    pub scheduler: SchedulerConfig,
}

impl BillingConfig {
    /// Loads TOML from `path`. A `DATABASE_URL` environment entry
    /// (including one provided via `.env`) overrides the configured
    /// connection string.
    pub fn load<P: AsRef<Path>>(path: P) -> BillingResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config: BillingConfig = toml::from_str(&raw).map_err(|e| {
            BillingError::ConfigError(format!(
                "failed to parse {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> BillingResult<Self> {
        let mut config = BillingConfig::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        dotenvy::dotenv().ok();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.storage.connection_string = Some(url);
        }
    }

    fn validate(&self) -> BillingResult<()> {
        if self.scheduler.tick_interval_secs == 0 {
            return Err(BillingError::ConfigError(
                "scheduler.tick_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::StoreEngineType;
    use std::io::Write;

    #[test]
    fn defaults_run_in_memory_daily() {
        let config = BillingConfig::default();
        assert_eq!(config.storage.engine, StoreEngineType::Memory);
        assert_eq!(config.scheduler.tick_interval_secs, 86_400);
    }

    #[test]
    fn loads_a_partial_toml_file() {
        std::env::remove_var("DATABASE_URL");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[storage]\nengine = \"postgres\"\nconnection_string = \"host=localhost user=rpm\"\n\n\
             [scheduler]\ninter_rule_delay_ms = 250"
        )
        .unwrap();

        let config = BillingConfig::load(file.path()).unwrap();
        assert_eq!(config.storage.engine, StoreEngineType::Postgres);
        assert_eq!(
            config.storage.connection_string.as_deref(),
            Some("host=localhost user=rpm")
        );
        assert_eq!(config.scheduler.inter_rule_delay_ms, 250);
        // Unspecified keys keep their defaults.
        assert_eq!(config.scheduler.tick_interval_secs, 86_400);
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\ntick_interval_secs = 0").unwrap();
        let err = BillingConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, BillingError::ConfigError(_)));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "storage = 7").unwrap();
        let err = BillingConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, BillingError::ConfigError(_)));
    }
}
