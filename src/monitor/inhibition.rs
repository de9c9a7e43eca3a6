//! Per-hive alert inhibition windows.
//!
//! A window suppresses notifications for one hive until it expires. There is
//! no background timer: every read drops an expired window before answering,
//! and `sweep_expired` can be called to purge the rest.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::entity::EntityId;
use crate::error::ValidationError;
use crate::time::Clock;

/// An active suppression window.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InhibitionWindow {
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub duration_hours: i64,
}

impl InhibitionWindow {
    /// A window is valid only while `now < expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Inhibition state of one hive.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InhibitionStatus {
    pub inhibited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<i64>,
    /// Whole hours left, rounded up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_remaining: Option<i64>,
}

impl InhibitionStatus {
    fn uninhibited() -> Self {
        Self {
            inhibited: false,
            expires_at: None,
            duration_hours: None,
            hours_remaining: None,
        }
    }
}

/// Owner of every inhibition window.
pub struct InhibitionManager {
    clock: Arc<dyn Clock>,
    max_hours: Option<i64>,
    windows: Mutex<HashMap<EntityId, InhibitionWindow>>,
}

impl std::fmt::Debug for InhibitionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InhibitionManager")
            .field("max_hours", &self.max_hours)
            .field("windows", &self.lock().len())
            .finish_non_exhaustive()
    }
}

impl InhibitionManager {
    /// Creates an empty manager. `max_hours` caps activation requests.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, max_hours: Option<i64>) -> Self {
        Self {
            clock,
            max_hours,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EntityId, InhibitionWindow>> {
        // Every mutation is a single insert or remove, so a poisoned map is
        // still consistent.
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inhibits `id` for `duration_hours`, replacing any existing window.
    ///
    /// # Errors
    ///
    /// Rejects non-positive durations and durations above the configured
    /// maximum; the existing window is left untouched.
    pub fn activate(&self, id: &EntityId, duration_hours: i64) -> Result<InhibitionWindow, ValidationError> {
        if duration_hours <= 0 {
            return Err(ValidationError::NonPositiveDuration { hours: duration_hours });
        }
        if let Some(max_hours) = self.max_hours {
            if duration_hours > max_hours {
                return Err(ValidationError::DurationTooLong {
                    hours: duration_hours,
                    max_hours,
                });
            }
        }

        let now = self.clock.now();
        let expires_at = Duration::try_hours(duration_hours)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "duration_hours".to_string(),
                value: duration_hours.to_string(),
                min: "1".to_string(),
                max: "representable time".to_string(),
            })?;

        let window = InhibitionWindow {
            activated_at: now,
            expires_at,
            duration_hours,
        };
        let replaced = self.lock().insert(id.clone(), window).is_some();
        info!(entity_id = %id, duration_hours, %expires_at, replaced, "inhibition activated");
        Ok(window)
    }

    /// Lifts the window for `id`. Returns whether one was present.
    pub fn deactivate(&self, id: &EntityId) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            info!(entity_id = %id, "inhibition deactivated");
        }
        removed
    }

    /// Whether notifications for `id` are currently suppressed.
    pub fn is_inhibited(&self, id: &EntityId) -> bool {
        self.current(id).is_some()
    }

    /// Inhibition state of `id`, with lazy expiry.
    pub fn status(&self, id: &EntityId) -> InhibitionStatus {
        let now = self.clock.now();
        match self.current_at(id, now) {
            None => InhibitionStatus::uninhibited(),
            Some(window) => {
                let secs = (window.expires_at - now).num_seconds().max(0);
                InhibitionStatus {
                    inhibited: true,
                    expires_at: Some(window.expires_at),
                    duration_hours: Some(window.duration_hours),
                    hours_remaining: Some((secs + 3_599) / 3_600),
                }
            }
        }
    }

    /// Removes every expired window and returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| !w.is_expired_at(now));
        let removed = before - windows.len();
        drop(windows);
        if removed > 0 {
            debug!(removed, "swept expired inhibition windows");
        }
        removed
    }

    /// Snapshot of all live windows.
    pub fn active_windows(&self) -> BTreeMap<EntityId, InhibitionWindow> {
        let now = self.clock.now();
        let mut windows = self.lock();
        windows.retain(|_, w| !w.is_expired_at(now));
        windows.iter().map(|(id, w)| (id.clone(), *w)).collect()
    }

    fn current(&self, id: &EntityId) -> Option<InhibitionWindow> {
        self.current_at(id, self.clock.now())
    }

    /// Reads the window for `id`, dropping it first if it has expired.
    fn current_at(&self, id: &EntityId, now: DateTime<Utc>) -> Option<InhibitionWindow> {
        let mut windows = self.lock();
        let window = *windows.get(id)?;
        if window.is_expired_at(now) {
            windows.remove(id);
            drop(windows);
            debug!(entity_id = %id, expired_at = %window.expires_at, "inhibition expired");
            return None;
        }
        Some(window)
    }
}
