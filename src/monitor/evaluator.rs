//! Threshold evaluation.
//!
//! `evaluate` is pure: the same reading and bounds always produce the same
//! conditions, in the same order (lid, temperature, humidity).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::reading::Reading;

/// Inclusive alert bounds.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub temp_min: f64,
    pub temp_max: f64,
    pub hum_min: f64,
    pub hum_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temp_min: 15.0,
            temp_max: 35.0,
            hum_min: 40.0,
            hum_max: 70.0,
        }
    }
}

impl Thresholds {
    /// Replaces each bound that has an override.
    #[must_use]
    pub fn with_overrides(
        &self,
        temp_min: Option<f64>,
        temp_max: Option<f64>,
        hum_min: Option<f64>,
        hum_max: Option<f64>,
    ) -> Self {
        Self {
            temp_min: temp_min.unwrap_or(self.temp_min),
            temp_max: temp_max.unwrap_or(self.temp_max),
            hum_min: hum_min.unwrap_or(self.hum_min),
            hum_max: hum_max.unwrap_or(self.hum_max),
        }
    }

    /// Bounds must be finite and ordered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, min, max) in [
            ("temp_min", self.temp_min, self.temp_max),
            ("hum_min", self.hum_min, self.hum_max),
        ] {
            if !min.is_finite() || !max.is_finite() || min > max {
                return Err(ValidationError::OutOfRange {
                    field: field.to_string(),
                    value: min.to_string(),
                    min: "-inf".to_string(),
                    max: max.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Kind of an alert condition, without its measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// Lid reported open.
    LidOpen,
    /// Temperature outside its bounds.
    Temperature,
    /// Humidity outside its bounds.
    Humidity,
}

impl ConditionKind {
    /// Stable name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LidOpen => "lid_open",
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified anomaly derived from one reading.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertCondition {
    LidOpen,
    TemperatureOutOfRange { min: f64, max: f64, actual: f64 },
    HumidityOutOfRange { min: f64, max: f64, actual: f64 },
}

impl AlertCondition {
    /// Kind of this condition.
    #[must_use]
    pub const fn kind(&self) -> ConditionKind {
        match self {
            Self::LidOpen => ConditionKind::LidOpen,
            Self::TemperatureOutOfRange { .. } => ConditionKind::Temperature,
            Self::HumidityOutOfRange { .. } => ConditionKind::Humidity,
        }
    }

    /// Short human-readable title.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::LidOpen => "Lid open",
            Self::TemperatureOutOfRange { .. } => "Temperature out of range",
            Self::HumidityOutOfRange { .. } => "Humidity out of range",
        }
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LidOpen => f.write_str("Lid open"),
            Self::TemperatureOutOfRange { min, max, actual } => {
                write!(f, "Temperature {actual:.1} °C outside {min:.1}-{max:.1} °C")
            }
            Self::HumidityOutOfRange { min, max, actual } => {
                write!(f, "Humidity {actual:.1} % outside {min:.1}-{max:.1} %")
            }
        }
    }
}

/// Classifies a reading against `bounds`.
#[must_use]
pub fn evaluate(reading: &Reading, bounds: &Thresholds) -> Vec<AlertCondition> {
    let mut out = Vec::new();

    if reading.lid_open() == Some(true) {
        out.push(AlertCondition::LidOpen);
    }

    if let Some(actual) = reading.temperature() {
        if actual < bounds.temp_min || actual > bounds.temp_max {
            out.push(AlertCondition::TemperatureOutOfRange {
                min: bounds.temp_min,
                max: bounds.temp_max,
                actual,
            });
        }
    }

    if let Some(actual) = reading.humidity() {
        if actual < bounds.hum_min || actual > bounds.hum_max {
            out.push(AlertCondition::HumidityOutOfRange {
                min: bounds.hum_min,
                max: bounds.hum_max,
                actual,
            });
        }
    }

    out
}
