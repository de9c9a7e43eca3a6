//! Monitored hives and the accounts that own them.
//!
//! Both records live in the remote store and are only read by the alert
//! pipeline. Threshold overrides are owned by the hive record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::monitor::evaluator::Thresholds;

/// Identifier of a monitored hive.
///
/// Ids are store keys, so they cannot be empty or contain a path separator.
///
/// # Examples
///
/// ```
/// use hivewatch::EntityId;
///
/// let id = EntityId::parse("H1").unwrap();
/// assert_eq!(id.as_str(), "H1");
/// assert!(EntityId::parse("hives/H1").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Validates and wraps a raw id.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyEntityId);
        }
        if trimmed.contains('/') {
            return Err(ValidationError::InvalidPath {
                path: raw.clone(),
                reason: "entity id cannot contain '/'".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntityId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Hive record as stored under the hives collection.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hive {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hum_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hum_max: Option<f64>,
}

impl Hive {
    /// Bounds for this hive: its own overrides on top of `defaults`.
    #[must_use]
    pub fn thresholds(&self, defaults: &Thresholds) -> Thresholds {
        defaults.with_overrides(self.temp_min, self.temp_max, self.hum_min, self.hum_max)
    }

    /// Name to show in messages, falling back to the id.
    #[must_use]
    pub fn display_name<'a>(&'a self, id: &'a EntityId) -> &'a str {
        if self.name.trim().is_empty() {
            id.as_str()
        } else {
            &self.name
        }
    }
}

/// Account record as stored under the users collection.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}
