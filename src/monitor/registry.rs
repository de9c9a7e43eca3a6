//! Live reading subscriptions.
//!
//! The registry owns at most one listener per key: the global stream over all
//! readings, plus one filtered stream per explicitly monitored hive. Listener
//! callbacks decode pushed documents and hand each reading to a
//! `ReadingSink`.
//!
//! A change can reach several listeners (the global one and a hive's own).
//! All listeners of one registry share a window of recently forwarded
//! changes and the first listener to claim a change forwards it. Which
//! listeners receive a change is fixed by the store when it publishes, so the
//! claim happens at delivery and never depends on what was started or stopped
//! in between.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use crate::entity::EntityId;
use crate::error::StoreError;
use crate::reading::Reading;
use crate::store::{Document, ListenerHandle, RemoteStore, StreamListener, StreamTarget};

/// Changes remembered for de-duplication across listeners.
const RECENT_CAPACITY: usize = 4_096;

/// Key of a registered subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubscriptionKey {
    /// The stream over every reading.
    Global,
    /// The filtered stream for one hive.
    Entity(EntityId),
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Entity(id) => write!(f, "entity:{id}"),
        }
    }
}

/// Consumer of decoded readings.
pub trait ReadingSink: Send + Sync {
    /// Handles one reading. Called from store delivery threads.
    fn on_reading(&self, reading: &Reading);
}

enum Slot {
    /// Reserved while the store listener is being attached.
    Starting,
    Live(ListenerHandle),
}

type ActiveMap = HashMap<SubscriptionKey, Slot>;

/// Bounded set of change keys already forwarded to the sink.
#[derive(Default)]
struct RecentChanges {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentChanges {
    /// Returns false if `key` was already claimed.
    fn claim(&mut self, key: String) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() >= RECENT_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Identity of one change: the document id plus its content.
fn change_key(doc: &Document) -> String {
    match serde_json::to_string(&doc.data) {
        Ok(body) => format!("{}\u{0}{body}", doc.id),
        Err(_) => doc.id.clone(),
    }
}

/// Registry of live reading subscriptions.
pub struct SubscriptionRegistry {
    store: Arc<dyn RemoteStore>,
    sink: Arc<dyn ReadingSink>,
    readings_path: String,
    entity_field: String,
    active: Mutex<ActiveMap>,
    recent: Arc<Mutex<RecentChanges>>,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("readings_path", &self.readings_path)
            .field("active", &self.list_active())
            .finish_non_exhaustive()
    }
}

impl SubscriptionRegistry {
    /// Creates an empty registry over `readings_path`.
    pub fn new(
        store: Arc<dyn RemoteStore>,
        sink: Arc<dyn ReadingSink>,
        readings_path: impl Into<String>,
        entity_field: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sink,
            readings_path: readings_path.into(),
            entity_field: entity_field.into(),
            active: Mutex::new(HashMap::new()),
            recent: Arc::new(Mutex::new(RecentChanges::default())),
        }
    }

    /// Attaches the global reading listener. Returns false if already active.
    pub fn start_global(&self) -> bool {
        let target = StreamTarget::Collection {
            path: self.readings_path.clone(),
        };
        self.start(SubscriptionKey::Global, target)
    }

    /// Attaches a listener for one hive. Returns false if already active.
    pub fn start_entity(&self, id: &EntityId) -> bool {
        let target = StreamTarget::Filtered {
            path: self.readings_path.clone(),
            field: self.entity_field.clone(),
            value: Value::String(id.to_string()),
        };
        self.start(SubscriptionKey::Entity(id.clone()), target)
    }

    /// Detaches the listener for one hive. Returns false if none was active.
    pub fn stop_entity(&self, id: &EntityId) -> bool {
        let key = SubscriptionKey::Entity(id.clone());
        let removed = lock(&self.active).remove(&key);
        match removed {
            Some(slot) => {
                if let Slot::Live(handle) = slot {
                    handle.cancel();
                }
                info!(subscription = %key, "subscription stopped");
                true
            }
            None => {
                debug!(subscription = %key, "no subscription to stop");
                false
            }
        }
    }

    /// Detaches every listener, the global one included.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<(SubscriptionKey, Slot)> = lock(&self.active).drain().collect();
        let count = drained.len();
        for (key, slot) in drained {
            if let Slot::Live(handle) = slot {
                handle.cancel();
            }
            debug!(subscription = %key, "subscription cancelled");
        }
        if count > 0 {
            info!(count, "all subscriptions stopped");
        }
        count
    }

    /// Whether `key` is registered, including a start still in progress.
    #[must_use]
    pub fn is_active(&self, key: &SubscriptionKey) -> bool {
        lock(&self.active).contains_key(key)
    }

    /// Keys of every registered subscription.
    #[must_use]
    pub fn list_active(&self) -> BTreeSet<SubscriptionKey> {
        lock(&self.active).keys().cloned().collect()
    }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn count(&self) -> usize {
        lock(&self.active).len()
    }

    fn start(&self, key: SubscriptionKey, target: StreamTarget) -> bool {
        {
            let mut active = lock(&self.active);
            if active.contains_key(&key) {
                debug!(subscription = %key, "subscription already active");
                return false;
            }
            active.insert(key.clone(), Slot::Starting);
        }

        let listener = Arc::new(ReadingListener {
            key: key.clone(),
            sink: Arc::clone(&self.sink),
            entity_field: self.entity_field.clone(),
            recent: Arc::clone(&self.recent),
        });
        // Subscribing may call back into the listener, so the lock is not held.
        let handle = self.store.subscribe(target, listener);

        let mut active = lock(&self.active);
        if !matches!(active.get(&key), Some(Slot::Starting)) {
            // Stopped while attaching.
            drop(active);
            handle.cancel();
            debug!(subscription = %key, "subscription stopped before it started");
            return false;
        }
        active.insert(key.clone(), Slot::Live(handle));
        drop(active);

        info!(subscription = %key, path = %self.readings_path, "subscription started");
        true
    }
}

struct ReadingListener {
    key: SubscriptionKey,
    sink: Arc<dyn ReadingSink>,
    entity_field: String,
    recent: Arc<Mutex<RecentChanges>>,
}

impl StreamListener for ReadingListener {
    fn on_change(&self, docs: &[Document]) {
        for doc in docs {
            if !lock(&self.recent).claim(change_key(doc)) {
                trace!(subscription = %self.key, doc_id = %doc.id, "change already forwarded");
                continue;
            }
            let reading = match Reading::from_document(doc, &self.entity_field, Utc::now()) {
                Ok(reading) => reading,
                Err(err) => {
                    warn!(subscription = %self.key, doc_id = %doc.id, error = %err, "skipping undecodable reading");
                    continue;
                }
            };
            self.sink.on_reading(&reading);
        }
    }

    fn on_error(&self, error: &StoreError) {
        // The store reconnects on its own; the subscription stays registered.
        error!(subscription = %self.key, %error, "reading stream reported an error");
    }
}
