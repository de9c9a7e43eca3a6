//! Service configuration.
//!
//! Every section is optional in the TOML file; missing fields take their
//! defaults. `HiveConfig::validate` runs after loading.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HiveError, HiveResult, ValidationError};
use crate::monitor::evaluator::Thresholds;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    /// Store paths and facade timeout.
    pub store: StoreConfig,
    /// Default alert bounds.
    pub thresholds: Thresholds,
    /// Inhibition limits.
    pub inhibition: InhibitionConfig,
    /// Outbound message settings.
    pub notification: NotificationConfig,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Wait bound for every facade call.
    pub timeout_secs: u64,
    pub readings_path: String,
    pub hives_path: String,
    pub users_path: String,
    /// Reading field that carries the hive id.
    pub entity_field: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            readings_path: "readings".to_string(),
            hives_path: "hives".to_string(),
            users_path: "users".to_string(),
            entity_field: "hiveId".to_string(),
        }
    }
}

impl StoreConfig {
    /// Facade wait bound.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Inhibition limits.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InhibitionConfig {
    /// Longest window a caller may request. `None` means unbounded.
    pub max_hours: Option<i64>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub sender: String,
    pub subject_prefix: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sender: "alerts@hivewatch.local".to_string(),
            subject_prefix: "[HiveWatch]".to_string(),
        }
    }
}

impl HiveConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> HiveResult<Self> {
        let cfg: Self = toml::from_str(raw).map_err(|e| HiveError::config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> HiveResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| HiveError::config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> HiveResult<()> {
        if self.store.timeout_secs == 0 {
            return Err(HiveError::config("store.timeout_secs must be greater than zero"));
        }
        for (name, path) in [
            ("store.readings_path", &self.store.readings_path),
            ("store.hives_path", &self.store.hives_path),
            ("store.users_path", &self.store.users_path),
        ] {
            if path.trim().is_empty() {
                return Err(HiveError::config(format!("{name} cannot be empty")));
            }
        }
        if self.store.entity_field.trim().is_empty() {
            return Err(HiveError::config("store.entity_field cannot be empty"));
        }
        self.thresholds.validate()?;
        if let Some(max) = self.inhibition.max_hours {
            if max <= 0 {
                return Err(ValidationError::NonPositiveDuration { hours: max }.into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = HiveConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.store.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.thresholds.temp_min, 15.0);
        assert_eq!(cfg.thresholds.hum_max, 70.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = HiveConfig::from_toml_str(
            r#"
            [store]
            timeout_secs = 5

            [thresholds]
            temp_max = 38.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.store.timeout_secs, 5);
        assert_eq!(cfg.store.readings_path, "readings");
        assert_eq!(cfg.thresholds.temp_max, 38.0);
        assert_eq!(cfg.thresholds.temp_min, 15.0);
        assert_eq!(cfg.inhibition.max_hours, None);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = HiveConfig::from_toml_str("[store]\ntimeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let err = HiveConfig::from_toml_str("[thresholds]\nhum_min = 80.0\n").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hivewatch.toml");
        std::fs::write(&path, "[inhibition]\nmax_hours = 72\n").unwrap();

        let cfg = HiveConfig::from_file(&path).unwrap();
        assert_eq!(cfg.inhibition.max_hours, Some(72));

        let missing = HiveConfig::from_file(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, HiveError::Config { .. }));
    }
}
