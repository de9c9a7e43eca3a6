//! Service entry point.
//!
//! `HiveMonitor` wires the store facade, the alert pipeline and the
//! subscription registry together and exposes the control surface used by
//! operators: which hives are monitored, and which are inhibited.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::info;

use crate::config::HiveConfig;
use crate::entity::EntityId;
use crate::error::HiveResult;
use crate::monitor::{
    AlertPipeline, InhibitionManager, InhibitionStatus, InhibitionWindow, NotificationChannel,
    NotificationDispatcher, SubscriptionKey, SubscriptionRegistry,
};
use crate::store::{BlockingStore, RemoteStore};
use crate::time::{Clock, SystemClock};

/// The running alert service.
///
/// Listeners registered with the store hold the pipeline, which in turn holds
/// the store. `shutdown` (also run on drop) cancels every listener and so
/// releases that cycle.
pub struct HiveMonitor {
    config: HiveConfig,
    store: BlockingStore,
    inhibition: Arc<InhibitionManager>,
    pipeline: Arc<AlertPipeline>,
    registry: SubscriptionRegistry,
}

impl std::fmt::Debug for HiveMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiveMonitor")
            .field("registry", &self.registry)
            .field("inhibition", &self.inhibition)
            .finish_non_exhaustive()
    }
}

impl HiveMonitor {
    /// Builds the service on the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn new(
        config: HiveConfig,
        remote: Arc<dyn RemoteStore>,
        channel: Arc<dyn NotificationChannel>,
    ) -> HiveResult<Self> {
        Self::with_clock(config, remote, channel, Arc::new(SystemClock))
    }

    /// Builds the service on an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn with_clock(
        config: HiveConfig,
        remote: Arc<dyn RemoteStore>,
        channel: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
    ) -> HiveResult<Self> {
        config.validate()?;

        let store = BlockingStore::new(Arc::clone(&remote), config.store.timeout());
        let inhibition = Arc::new(InhibitionManager::new(clock, config.inhibition.max_hours));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            channel,
            config.store.hives_path.clone(),
            config.store.users_path.clone(),
            config.notification.clone(),
        ));
        let pipeline = Arc::new(AlertPipeline::new(
            store.clone(),
            config.thresholds,
            config.store.hives_path.clone(),
            Arc::clone(&inhibition),
            dispatcher,
        ));
        let registry = SubscriptionRegistry::new(
            remote,
            pipeline.clone(),
            config.store.readings_path.clone(),
            config.store.entity_field.clone(),
        );

        Ok(Self {
            config,
            store,
            inhibition,
            pipeline,
            registry,
        })
    }

    /// Attaches the global reading listener. Safe to call more than once.
    pub fn start(&self) {
        if self.registry.start_global() {
            info!(path = %self.config.store.readings_path, "hive monitor started");
        }
    }

    /// Cancels every subscription. Returns how many were cancelled.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.registry.stop_all();
        info!(
            cancelled,
            processed = self.pipeline.processed(),
            sent = self.pipeline.dispatcher().sent(),
            "hive monitor stopped"
        );
        cancelled
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &HiveConfig {
        &self.config
    }

    /// The blocking facade the service reads through.
    #[must_use]
    pub fn store(&self) -> &BlockingStore {
        &self.store
    }

    /// The per-reading pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<AlertPipeline> {
        &self.pipeline
    }

    /// The subscription registry.
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    // ── Monitoring ──

    /// Starts a dedicated subscription for one hive.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unusable id.
    pub fn start_monitoring(&self, id: &str) -> HiveResult<bool> {
        let id = EntityId::parse(id)?;
        Ok(self.registry.start_entity(&id))
    }

    /// Stops the dedicated subscription for one hive.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unusable id.
    pub fn stop_monitoring(&self, id: &str) -> HiveResult<bool> {
        let id = EntityId::parse(id)?;
        Ok(self.registry.stop_entity(&id))
    }

    /// Whether `id` has a dedicated subscription.
    #[must_use]
    pub fn is_monitoring(&self, id: &str) -> bool {
        EntityId::parse(id)
            .map(|id| self.registry.is_active(&SubscriptionKey::Entity(id)))
            .unwrap_or(false)
    }

    /// Number of hives with a dedicated subscription.
    #[must_use]
    pub fn monitored_count(&self) -> usize {
        self.monitored_entities().len()
    }

    /// Hives with a dedicated subscription.
    #[must_use]
    pub fn monitored_entities(&self) -> BTreeSet<EntityId> {
        self.registry
            .list_active()
            .into_iter()
            .filter_map(|key| match key {
                SubscriptionKey::Entity(id) => Some(id),
                SubscriptionKey::Global => None,
            })
            .collect()
    }

    // ── Inhibition ──

    /// Suppresses alerts for `id` during the next `hours`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unusable id or duration.
    pub fn activate_inhibition(&self, id: &str, hours: i64) -> HiveResult<InhibitionWindow> {
        let id = EntityId::parse(id)?;
        Ok(self.inhibition.activate(&id, hours)?)
    }

    /// Lifts the inhibition for `id`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unusable id.
    pub fn deactivate_inhibition(&self, id: &str) -> HiveResult<bool> {
        let id = EntityId::parse(id)?;
        Ok(self.inhibition.deactivate(&id))
    }

    /// Inhibition state of one hive.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unusable id.
    pub fn inhibition_status(&self, id: &str) -> HiveResult<InhibitionStatus> {
        let id = EntityId::parse(id)?;
        Ok(self.inhibition.status(&id))
    }

    /// Every live inhibition window.
    #[must_use]
    pub fn active_inhibitions(&self) -> BTreeMap<EntityId, InhibitionWindow> {
        self.inhibition.active_windows()
    }

    /// Status of every hive with a live window.
    #[must_use]
    pub fn inhibition_statuses(&self) -> BTreeMap<EntityId, InhibitionStatus> {
        self.inhibition
            .active_windows()
            .into_keys()
            .map(|id| {
                let status = self.inhibition.status(&id);
                (id, status)
            })
            .collect()
    }

    /// Drops expired windows now. Returns how many were dropped.
    pub fn sweep_inhibitions(&self) -> usize {
        self.inhibition.sweep_expired()
    }
}

impl Drop for HiveMonitor {
    fn drop(&mut self) {
        self.registry.stop_all();
    }
}
