//! Reading evaluation pipeline.
//!
//! For each reading: resolve bounds, classify, check inhibition, dispatch.
//! The pipeline holds no lock of its own; inhibition is consulted once per
//! reading and the dispatcher runs with nothing held.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::entity::{EntityId, Hive};
use crate::reading::Reading;
use crate::store::{join_path, BlockingStore};

use super::dispatcher::NotificationDispatcher;
use super::evaluator::{evaluate, AlertCondition, Thresholds};
use super::inhibition::InhibitionManager;
use super::registry::ReadingSink;

/// Result of processing one reading.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    /// Conditions the reading triggered.
    pub conditions: Vec<AlertCondition>,
    /// Whether an inhibition window suppressed them.
    pub inhibited: bool,
    /// Number of dispatcher calls made.
    pub dispatched: usize,
}

/// Evaluates readings and dispatches alerts.
pub struct AlertPipeline {
    store: BlockingStore,
    defaults: Thresholds,
    hives_path: String,
    inhibition: Arc<InhibitionManager>,
    dispatcher: Arc<NotificationDispatcher>,
    processed: AtomicU64,
    suppressed: AtomicU64,
}

impl std::fmt::Debug for AlertPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertPipeline")
            .field("defaults", &self.defaults)
            .field("processed", &self.processed())
            .field("suppressed", &self.suppressed())
            .finish_non_exhaustive()
    }
}

impl AlertPipeline {
    /// Creates a pipeline that falls back to `defaults` for hives without bounds.
    pub fn new(
        store: BlockingStore,
        defaults: Thresholds,
        hives_path: impl Into<String>,
        inhibition: Arc<InhibitionManager>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            defaults,
            hives_path: hives_path.into(),
            inhibition,
            dispatcher,
            processed: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Runs one reading through the pipeline.
    pub fn process(&self, reading: &Reading) -> ProcessOutcome {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let id = reading.entity_id();

        let bounds = if reading.temperature().is_some() || reading.humidity().is_some() {
            self.thresholds_for(id)
        } else {
            self.defaults
        };

        let conditions = evaluate(reading, &bounds);
        if conditions.is_empty() {
            return ProcessOutcome {
                conditions,
                inhibited: false,
                dispatched: 0,
            };
        }

        if self.inhibition.is_inhibited(id) {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            debug!(entity_id = %id, count = conditions.len(), "alerts suppressed by inhibition");
            return ProcessOutcome {
                conditions,
                inhibited: true,
                dispatched: 0,
            };
        }

        for condition in &conditions {
            debug!(entity_id = %id, kind = %condition.kind(), "alert condition detected");
            self.dispatcher.notify(id, condition, reading);
        }

        let dispatched = conditions.len();
        ProcessOutcome {
            conditions,
            inhibited: false,
            dispatched,
        }
    }

    /// Readings seen so far.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Readings whose alerts were suppressed.
    #[must_use]
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    /// The dispatcher alerts are sent through.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// Hive-specific bounds, or the defaults when the hive has none or
    /// cannot be read.
    fn thresholds_for(&self, id: &EntityId) -> Thresholds {
        match self.store.get_as::<Hive>(&join_path(&self.hives_path, id.as_str())) {
            Ok(Some(hive)) => {
                let bounds = hive.thresholds(&self.defaults);
                if let Err(err) = bounds.validate() {
                    warn!(entity_id = %id, error = %err, "hive thresholds invalid, using defaults");
                    return self.defaults;
                }
                bounds
            }
            Ok(None) => self.defaults,
            Err(err) => {
                warn!(entity_id = %id, error = %err, "cannot load hive thresholds, using defaults");
                self.defaults
            }
        }
    }
}

impl ReadingSink for AlertPipeline {
    fn on_reading(&self, reading: &Reading) {
        self.process(reading);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::config::NotificationConfig;
    use crate::error::NotificationError;
    use crate::monitor::dispatcher::{NotificationChannel, OutboundMessage};
    use crate::store::InMemoryStore;
    use crate::time::SystemClock;

    #[derive(Default)]
    struct Outbox {
        subjects: Mutex<Vec<String>>,
    }

    impl NotificationChannel for Outbox {
        fn send(&self, message: &OutboundMessage) -> Result<(), NotificationError> {
            self.subjects.lock().unwrap().push(message.subject.clone());
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        outbox: Arc<Outbox>,
        inhibition: Arc<InhibitionManager>,
        pipeline: AlertPipeline,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        store
            .seed("hives", "H1", json!({ "name": "Orchard", "ownerId": "u1", "tempMax": 30.0 }))
            .unwrap();
        store
            .seed("hives", "H2", json!({ "name": "Meadow", "ownerId": "u1" }))
            .unwrap();
        store
            .seed("users", "u1", json!({ "email": "keeper@example.com" }))
            .unwrap();

        let facade = BlockingStore::new(store.clone(), Duration::from_secs(2));
        let outbox = Arc::new(Outbox::default());
        let inhibition = Arc::new(InhibitionManager::new(Arc::new(SystemClock), None));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            facade.clone(),
            outbox.clone(),
            "hives",
            "users",
            NotificationConfig::default(),
        ));
        let pipeline = AlertPipeline::new(
            facade,
            Thresholds::default(),
            "hives",
            Arc::clone(&inhibition),
            dispatcher,
        );
        Fixture {
            store,
            outbox,
            inhibition,
            pipeline,
        }
    }

    fn reading(raw: &str) -> Reading {
        Reading::new(EntityId::parse(raw).unwrap(), Utc::now())
    }

    #[test]
    fn test_quiet_reading_dispatches_nothing() {
        let fx = fixture();
        let outcome = fx.pipeline.process(&reading("H2").with_temperature(25.0).with_lid_open(false));
        assert!(outcome.conditions.is_empty());
        assert_eq!(outcome.dispatched, 0);
        assert!(fx.outbox.subjects.lock().unwrap().is_empty());
    }

    #[test]
    fn test_hive_bounds_override_defaults() {
        let fx = fixture();
        // 32 °C is inside the default range but above H1's own maximum.
        let h1 = fx.pipeline.process(&reading("H1").with_temperature(32.0));
        assert_eq!(h1.dispatched, 1);
        let h2 = fx.pipeline.process(&reading("H2").with_temperature(32.0));
        assert_eq!(h2.dispatched, 0);

        assert_eq!(
            *fx.outbox.subjects.lock().unwrap(),
            vec!["[HiveWatch] Temperature out of range on Orchard".to_string()]
        );
    }

    #[test]
    fn test_inhibition_is_per_entity() {
        let fx = fixture();
        let h1 = EntityId::parse("H1").unwrap();
        fx.inhibition.activate(&h1, 1).unwrap();

        let x = fx.pipeline.process(&reading("H1").with_lid_open(true));
        assert!(x.inhibited);
        assert_eq!(x.dispatched, 0);

        let y = fx.pipeline.process(&reading("H2").with_lid_open(true));
        assert!(!y.inhibited);
        assert_eq!(y.dispatched, 1);

        assert_eq!(
            *fx.outbox.subjects.lock().unwrap(),
            vec!["[HiveWatch] Lid open on Meadow".to_string()]
        );
        assert_eq!(fx.pipeline.suppressed(), 1);
    }

    #[test]
    fn test_every_condition_is_dispatched() {
        let fx = fixture();
        let outcome = fx
            .pipeline
            .process(&reading("H2").with_lid_open(true).with_humidity(95.0));
        assert_eq!(outcome.dispatched, 2);
        assert_eq!(fx.outbox.subjects.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_store_outage_falls_back_to_defaults() {
        let fx = fixture();
        fx.store.deny_path("hives");
        let outcome = fx.pipeline.process(&reading("H1").with_temperature(32.0));
        // Defaults apply (15-35), so nothing fires.
        assert!(outcome.conditions.is_empty());
        assert_eq!(fx.pipeline.processed(), 1);
    }
}
