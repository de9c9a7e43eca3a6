//! Alert notifications.
//!
//! The dispatcher resolves the hive and its owner through the blocking
//! facade, composes a plain-text message and hands it to a
//! `NotificationChannel`. Nothing here returns an error to the pipeline:
//! missing records and transport failures are logged and reported through
//! `DispatchOutcome`.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::NotificationConfig;
use crate::entity::{Account, EntityId, Hive};
use crate::error::{HiveError, HiveResult, NotificationError};
use crate::reading::Reading;
use crate::store::{join_path, BlockingStore};

use super::evaluator::AlertCondition;

/// A message ready for the outbound channel.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound transport (email, SMS gateway, ...).
pub trait NotificationChannel: Send + Sync {
    /// Attempts delivery of one message.
    fn send(&self, message: &OutboundMessage) -> Result<(), NotificationError>;
}

/// Channel that writes every message to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn send(&self, message: &OutboundMessage) -> Result<(), NotificationError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "notification"
        );
        Ok(())
    }
}

/// What a dispatch attempt ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The channel accepted the message.
    Sent,
    /// The hive or its owner could not be resolved.
    #[allow(missing_docs)]
    Unresolved { reason: String },
    /// The channel rejected the message.
    #[allow(missing_docs)]
    Failed { reason: String },
}

/// Composes and sends alert messages.
pub struct NotificationDispatcher {
    store: BlockingStore,
    channel: Arc<dyn NotificationChannel>,
    hives_path: String,
    users_path: String,
    settings: NotificationConfig,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("hives_path", &self.hives_path)
            .field("users_path", &self.users_path)
            .field("sent", &self.sent())
            .field("failed", &self.failed())
            .finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    /// Creates a dispatcher reading records from `hives_path` and `users_path`.
    pub fn new(
        store: BlockingStore,
        channel: Arc<dyn NotificationChannel>,
        hives_path: impl Into<String>,
        users_path: impl Into<String>,
        settings: NotificationConfig,
    ) -> Self {
        Self {
            store,
            channel,
            hives_path: hives_path.into(),
            users_path: users_path.into(),
            settings,
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Sends a lid-open alert for `id`.
    pub fn notify_lid_open(&self, id: &EntityId, reading: &Reading) -> DispatchOutcome {
        self.notify(id, &AlertCondition::LidOpen, reading)
    }

    /// Sends an alert for any condition.
    ///
    /// The caller decides whether to call this at all; inhibition is not
    /// checked here.
    pub fn notify(&self, id: &EntityId, condition: &AlertCondition, reading: &Reading) -> DispatchOutcome {
        let (hive, account) = match self.resolve(id) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(entity_id = %id, kind = %condition.kind(), error = %err, "cannot resolve alert recipient");
                return DispatchOutcome::Unresolved {
                    reason: err.to_string(),
                };
            }
        };

        let message = self.compose(id, &hive, &account, condition, reading);
        match self.channel.send(&message) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                info!(entity_id = %id, kind = %condition.kind(), to = %message.to, "alert sent");
                DispatchOutcome::Sent
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(entity_id = %id, kind = %condition.kind(), error = %err, "alert delivery failed");
                DispatchOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Messages accepted by the channel.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Messages the channel rejected.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn resolve(&self, id: &EntityId) -> HiveResult<(Hive, Account)> {
        let hive: Hive = self
            .store
            .get_as(&join_path(&self.hives_path, id.as_str()))?
            .ok_or_else(|| HiveError::not_found("Hive", id.as_str()))?;

        let owner_id = hive
            .owner_id
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or_else(|| HiveError::not_found("Owner of hive", id.as_str()))?;

        let account: Account = self
            .store
            .get_as(&join_path(&self.users_path, owner_id))?
            .ok_or_else(|| HiveError::not_found("Account", owner_id))?;

        if account.email.trim().is_empty() {
            return Err(HiveError::not_found("Email of account", owner_id));
        }
        Ok((hive, account))
    }

    fn compose(
        &self,
        id: &EntityId,
        hive: &Hive,
        account: &Account,
        condition: &AlertCondition,
        reading: &Reading,
    ) -> OutboundMessage {
        let name = hive.display_name(id);
        let subject = format!("{} {} on {}", self.settings.subject_prefix, condition.title(), name)
            .trim()
            .to_string();

        let mut body = String::new();
        if let Some(display) = account.display_name.as_deref().filter(|d| !d.trim().is_empty()) {
            let _ = writeln!(body, "Hello {display},");
            body.push('\n');
        }
        let _ = writeln!(body, "Hive: {name} ({id})");
        let _ = writeln!(body, "Alert: {condition}");
        let _ = writeln!(body, "Time: {}", reading.timestamp().to_rfc3339());
        if let Some(t) = reading.temperature() {
            let _ = writeln!(body, "Temperature: {t:.1} °C");
        }
        if let Some(h) = reading.humidity() {
            let _ = writeln!(body, "Humidity: {h:.1} %");
        }
        if let Some(open) = reading.lid_open() {
            let _ = writeln!(body, "Lid: {}", if open { "open" } else { "closed" });
        }
        if let Some(b) = reading.battery() {
            let _ = writeln!(body, "Battery: {b} %");
        }
        if let Some(s) = reading.signal() {
            let _ = writeln!(body, "Signal: {s} %");
        }
        if let Some(code) = reading.error_code() {
            let _ = writeln!(body, "Device error: {code}");
        }

        OutboundMessage {
            from: self.settings.sender.clone(),
            to: account.email.clone(),
            subject,
            body,
        }
    }
}
