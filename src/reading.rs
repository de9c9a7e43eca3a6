//! Sensor readings.
//!
//! A `Reading` is one timestamped sample pushed by a hive. It is immutable
//! once built; the builder-style `with_*` methods consume and return it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::{StoreError, ValidationError};
use crate::store::Document;

/// One sensor sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    entity_id: EntityId,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lid_open: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    battery: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signal: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
}

/// Wire shape of the non-identity fields of a reading document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadingFields {
    #[serde(default)]
    timestamp: Option<RawTimestamp>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    humidity: Option<f64>,
    #[serde(default)]
    lid_open: Option<bool>,
    #[serde(default)]
    battery: Option<i64>,
    #[serde(default)]
    signal: Option<i64>,
    #[serde(default)]
    error_code: Option<String>,
}

/// Devices report either epoch milliseconds or RFC 3339 text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(DateTime<Utc>),
}

impl Reading {
    /// Creates a reading with no measurements.
    #[must_use]
    pub fn new(entity_id: EntityId, timestamp: DateTime<Utc>) -> Self {
        Self {
            entity_id,
            timestamp,
            temperature: None,
            humidity: None,
            lid_open: None,
            battery: None,
            signal: None,
            error_code: None,
        }
    }

    /// Sets the temperature in °C.
    #[must_use]
    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature = Some(celsius);
        self
    }

    /// Sets the relative humidity in %.
    #[must_use]
    pub fn with_humidity(mut self, percent: f64) -> Self {
        self.humidity = Some(percent);
        self
    }

    /// Sets the lid state.
    #[must_use]
    pub fn with_lid_open(mut self, open: bool) -> Self {
        self.lid_open = Some(open);
        self
    }

    /// Sets the battery level.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::OutOfRange` above 100.
    pub fn with_battery(mut self, percent: u8) -> Result<Self, ValidationError> {
        self.battery = Some(percent_field("battery", i64::from(percent))?);
        Ok(self)
    }

    /// Sets the signal quality.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::OutOfRange` above 100.
    pub fn with_signal(mut self, percent: u8) -> Result<Self, ValidationError> {
        self.signal = Some(percent_field("signal", i64::from(percent))?);
        Ok(self)
    }

    /// Sets the device error code.
    #[must_use]
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// Decodes a reading document.
    ///
    /// `entity_field` names the document field holding the hive id. A missing
    /// timestamp falls back to `received_at`.
    pub fn from_document(
        doc: &Document,
        entity_field: &str,
        received_at: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        let decode_err = |message: String| StoreError::Decode {
            path: doc.id.clone(),
            message,
        };

        let raw_id = doc
            .data
            .get(entity_field)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| decode_err(format!("missing string field '{entity_field}'")))?;
        let entity_id = EntityId::parse(raw_id).map_err(|e| decode_err(e.to_string()))?;

        let fields: ReadingFields = doc.decode().map_err(|e| decode_err(e.to_string()))?;

        let timestamp = match fields.timestamp {
            None => received_at,
            Some(RawTimestamp::Text(ts)) => ts,
            Some(RawTimestamp::Millis(ms)) => DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| decode_err(format!("timestamp {ms} is out of range")))?,
        };

        let battery = fields
            .battery
            .map(|v| percent_field("battery", v))
            .transpose()
            .map_err(|e| decode_err(e.to_string()))?;
        let signal = fields
            .signal
            .map(|v| percent_field("signal", v))
            .transpose()
            .map_err(|e| decode_err(e.to_string()))?;

        Ok(Self {
            entity_id,
            timestamp,
            temperature: fields.temperature,
            humidity: fields.humidity,
            lid_open: fields.lid_open,
            battery,
            signal,
            error_code: fields.error_code,
        })
    }

    /// Hive the sample belongs to.
    #[must_use]
    pub const fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// When the sample was taken.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Temperature in °C. NaN is reported as absent.
    #[must_use]
    pub fn temperature(&self) -> Option<f64> {
        self.temperature.filter(|v| !v.is_nan())
    }

    /// Relative humidity in %. NaN is reported as absent.
    #[must_use]
    pub fn humidity(&self) -> Option<f64> {
        self.humidity.filter(|v| !v.is_nan())
    }

    /// Lid state, if reported.
    #[must_use]
    pub const fn lid_open(&self) -> Option<bool> {
        self.lid_open
    }

    /// Battery level in %.
    #[must_use]
    pub const fn battery(&self) -> Option<u8> {
        self.battery
    }

    /// Signal quality in %.
    #[must_use]
    pub const fn signal(&self) -> Option<u8> {
        self.signal
    }

    /// Device error code, if any.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }
}

fn percent_field(field: &str, value: i64) -> Result<u8, ValidationError> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or_else(|| ValidationError::OutOfRange {
            field: field.to_string(),
            value: value.to_string(),
            min: "0".to_string(),
            max: "100".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(data: serde_json::Value) -> Document {
        Document::from_value("r1", data).unwrap()
    }

    #[test]
    fn test_from_document_full() {
        let now = Utc::now();
        let r = Reading::from_document(
            &doc(json!({
                "hiveId": "H1",
                "timestamp": 1_704_067_200_000_i64,
                "temperature": 36.5,
                "humidity": 55.0,
                "lidOpen": true,
                "battery": 80,
                "signal": 42,
                "errorCode": "E12"
            })),
            "hiveId",
            now,
        )
        .unwrap();

        assert_eq!(r.entity_id().as_str(), "H1");
        assert_eq!(r.timestamp().timestamp(), 1_704_067_200);
        assert_eq!(r.temperature(), Some(36.5));
        assert_eq!(r.lid_open(), Some(true));
        assert_eq!(r.battery(), Some(80));
        assert_eq!(r.signal(), Some(42));
        assert_eq!(r.error_code(), Some("E12"));
    }

    #[test]
    fn test_from_document_defaults_timestamp() {
        let now = Utc::now();
        let r = Reading::from_document(&doc(json!({ "hiveId": "H2" })), "hiveId", now).unwrap();
        assert_eq!(r.timestamp(), now);
        assert_eq!(r.temperature(), None);
        assert_eq!(r.lid_open(), None);
    }

    #[test]
    fn test_from_document_accepts_rfc3339() {
        let r = Reading::from_document(
            &doc(json!({ "hiveId": "H2", "timestamp": "2024-06-01T12:00:00Z" })),
            "hiveId",
            Utc::now(),
        )
        .unwrap();
        assert_eq!(r.timestamp().to_rfc3339(), "2024-06-01T12:00:00+00:00");
    }

    #[test]
    fn test_from_document_rejects_bad_input() {
        let now = Utc::now();
        let missing = Reading::from_document(&doc(json!({ "temperature": 20.0 })), "hiveId", now);
        assert!(matches!(missing, Err(StoreError::Decode { .. })));

        let battery = Reading::from_document(
            &doc(json!({ "hiveId": "H1", "battery": 140 })),
            "hiveId",
            now,
        );
        assert!(matches!(battery, Err(StoreError::Decode { .. })));

        let wrong_type = Reading::from_document(
            &doc(json!({ "hiveId": "H1", "lidOpen": "yes" })),
            "hiveId",
            now,
        );
        assert!(wrong_type.is_err());
    }

    #[test]
    fn test_custom_entity_field() {
        let r = Reading::from_document(&doc(json!({ "deviceId": "D4" })), "deviceId", Utc::now())
            .unwrap();
        assert_eq!(r.entity_id().as_str(), "D4");
    }

    #[test]
    fn test_nan_is_absent() {
        let r = Reading::new(EntityId::parse("H1").unwrap(), Utc::now()).with_temperature(f64::NAN);
        assert_eq!(r.temperature(), None);
    }

    #[test]
    fn test_builder_validates_percentages() {
        let base = Reading::new(EntityId::parse("H1").unwrap(), Utc::now());
        assert!(base.clone().with_battery(100).is_ok());
        assert!(base.with_signal(101).is_err());
    }
}
