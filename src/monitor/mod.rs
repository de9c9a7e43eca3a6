//! Reading monitoring and alerting.
//!
//! Readings arrive through store subscriptions held by the
//! `SubscriptionRegistry`, are classified by `evaluate`, gated by the
//! `InhibitionManager` and finally handed to the `NotificationDispatcher`.
//! `AlertPipeline` ties those stages together.

/// Outbound alert composition and delivery.
pub mod dispatcher;
/// Threshold classification of readings.
pub mod evaluator;
/// Per-hive suppression windows.
pub mod inhibition;
/// Per-reading orchestration.
pub mod pipeline;
/// Live subscription bookkeeping.
pub mod registry;

pub use dispatcher::{DispatchOutcome, LogChannel, NotificationChannel, NotificationDispatcher, OutboundMessage};
pub use evaluator::{evaluate, AlertCondition, ConditionKind, Thresholds};
pub use inhibition::{InhibitionManager, InhibitionStatus, InhibitionWindow};
pub use pipeline::{AlertPipeline, ProcessOutcome};
pub use registry::{ReadingSink, SubscriptionKey, SubscriptionRegistry};
