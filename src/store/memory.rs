//! In-memory remote store.
//!
//! A thread-safe reference implementation of `RemoteStore`. Like the hosted
//! store it never completes a call on the caller's thread: completions run on
//! a dedicated worker and pushed changes on a separate delivery worker, so a
//! listener can call back into the blocking facade without deadlocking.
//!
//! Faults can be injected per path prefix: stalled paths never complete,
//! denied paths fail with `permission-denied`.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde_json::{Map, Value};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::StoreError;

use super::traits::{
    join_path, split_path, Completion, Document, ListenerHandle, RemoteStore, StreamListener,
    StreamTarget,
};

type Job = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Stall,
    Deny,
}

struct ListenerEntry {
    target: StreamTarget,
    listener: Arc<dyn StreamListener>,
}

#[derive(Default)]
struct Faults {
    stalled: Vec<String>,
    denied: Vec<String>,
}

struct Shared {
    collections: RwLock<HashMap<String, BTreeMap<String, Map<String, Value>>>>,
    listeners: Mutex<HashMap<u64, ListenerEntry>>,
    next_listener: AtomicU64,
    faults: Mutex<Faults>,
    // Completions for stalled paths are kept alive so callers see a timeout,
    // not a disconnect.
    parked: Mutex<Vec<Box<dyn Any + Send>>>,
    delivery_tx: Sender<Job>,
}

fn lock_err(path: &str) -> StoreError {
    StoreError::Remote {
        path: path.to_string(),
        code: "internal".to_string(),
        message: "poisoned lock".to_string(),
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn has_prefix(prefixes: &[String], path: &str) -> bool {
    prefixes.iter().any(|p| path == p || path.starts_with(&format!("{p}/")))
}

impl Shared {
    fn fault_for(&self, path: &str) -> Option<Fault> {
        let faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        if has_prefix(&faults.stalled, path) {
            Some(Fault::Stall)
        } else if has_prefix(&faults.denied, path) {
            Some(Fault::Deny)
        } else {
            None
        }
    }

    fn read_doc(&self, path: &str) -> Result<Option<Document>, StoreError> {
        let (collection, id) = split_path(path).ok_or_else(|| StoreError::Remote {
            path: path.to_string(),
            code: "invalid-argument".to_string(),
            message: "not a document path".to_string(),
        })?;
        let collections = self.collections.read().map_err(|_| lock_err(path))?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    fn query_docs(&self, path: &str, field: &str, value: &Value) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().map_err(|_| lock_err(path))?;
        Ok(collections
            .get(path)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| data.get(field) == Some(value))
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn write_doc(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
        merge: bool,
    ) -> Result<Document, StoreError> {
        let full = join_path(collection, id);
        let doc = {
            let mut collections = self.collections.write().map_err(|_| lock_err(&full))?;
            let docs = collections.entry(collection.to_string()).or_default();
            if merge {
                let existing = docs.get_mut(id).ok_or_else(|| StoreError::Remote {
                    path: full.clone(),
                    code: "not-found".to_string(),
                    message: "no document to update".to_string(),
                })?;
                existing.extend(data);
                Document::new(id, existing.clone())
            } else {
                docs.insert(id.to_string(), data.clone());
                Document::new(id, data)
            }
        };
        self.publish(collection, doc.clone());
        Ok(doc)
    }

    fn remove_doc(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let full = join_path(collection, id);
        let mut collections = self.collections.write().map_err(|_| lock_err(&full))?;
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    /// Queues a change for every matching listener.
    fn publish(&self, collection: &str, doc: Document) {
        let targets: Vec<Arc<dyn StreamListener>> = {
            let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners
                .values()
                .filter(|entry| entry.target.matches(collection, &doc))
                .map(|entry| Arc::clone(&entry.listener))
                .collect()
        };
        if targets.is_empty() {
            return;
        }
        let _ = self.delivery_tx.send(Box::new(move || {
            let docs = [doc];
            for listener in targets {
                listener.on_change(&docs);
            }
        }));
    }

    fn publish_error(&self, path: &str, err: StoreError) {
        let targets: Vec<Arc<dyn StreamListener>> = {
            let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners
                .values()
                .filter(|entry| entry.target.path() == path)
                .map(|entry| Arc::clone(&entry.listener))
                .collect()
        };
        let _ = self.delivery_tx.send(Box::new(move || {
            for listener in targets {
                listener.on_error(&err);
            }
        }));
    }
}

/// Thread-backed in-memory implementation of `RemoteStore`.
pub struct InMemoryStore {
    shared: Arc<Shared>,
    completion_tx: Sender<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store and starts its workers.
    #[must_use]
    pub fn new() -> Self {
        // Unbounded: a completion job may publish while the delivery worker
        // is itself waiting on a completion.
        let (completion_tx, completion_rx) = unbounded::<Job>();
        let (delivery_tx, delivery_rx) = unbounded::<Job>();

        let shared = Arc::new(Shared {
            collections: RwLock::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            faults: Mutex::new(Faults::default()),
            parked: Mutex::new(Vec::new()),
            delivery_tx,
        });

        let workers = vec![
            spawn_worker("hivewatch-store-completion", completion_rx),
            spawn_worker("hivewatch-store-delivery", delivery_rx),
        ];

        Self {
            shared,
            completion_tx,
            workers: Mutex::new(workers),
        }
    }

    /// Writes a document directly, without notifying listeners.
    pub fn seed(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        let collection = collection.trim_matches('/');
        let full = join_path(collection, id);
        let Value::Object(data) = data else {
            return Err(StoreError::Decode {
                path: full,
                message: "seed data must be an object".to_string(),
            });
        };
        let mut collections = self.shared.collections.write().map_err(|_| lock_err(&full))?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    /// Calls under `prefix` never complete.
    pub fn stall_path(&self, prefix: &str) {
        let mut faults = self.shared.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults.stalled.push(prefix.trim_matches('/').to_string());
    }

    /// Calls and subscriptions under `prefix` fail with `permission-denied`.
    pub fn deny_path(&self, prefix: &str) {
        let mut faults = self.shared.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults.denied.push(prefix.trim_matches('/').to_string());
    }

    /// Removes every injected fault.
    ///
    /// Completions held for stalled calls are dropped, so a caller still
    /// waiting on one sees `Disconnected`.
    pub fn clear_faults(&self) {
        let mut faults = self.shared.faults.lock().unwrap_or_else(PoisonError::into_inner);
        *faults = Faults::default();
        drop(faults);

        let released: Vec<Box<dyn Any + Send>> = std::mem::take(
            &mut *self.shared.parked.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if !released.is_empty() {
            debug!(count = released.len(), "released stalled completions");
        }
    }

    /// Reports `err` to every listener attached to `path`.
    pub fn emit_stream_error(&self, path: &str, err: StoreError) {
        self.shared.publish_error(path, err);
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Blocks until every queued completion and delivery has run.
    pub fn flush(&self) {
        // Completion jobs publish deliveries, so drain completions first.
        for queue in [&self.completion_tx, &self.shared.delivery_tx] {
            let (tx, rx) = bounded::<()>(1);
            let barrier: Job = Box::new(move || {
                let _ = tx.send(());
            });
            if queue.send(barrier).is_ok() {
                let _ = rx.recv();
            }
        }
    }

    fn complete<T, F>(&self, path: &str, done: Completion<T>, op: F)
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    {
        match self.shared.fault_for(path.trim_matches('/')) {
            Some(Fault::Stall) => {
                debug!(path, "stalling store call");
                self.shared
                    .parked
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(Box::new(done));
            }
            Some(Fault::Deny) => {
                let err = StoreError::permission_denied(path);
                let _ = self.completion_tx.send(Box::new(move || done(Err(err))));
            }
            None => {
                let _ = self.completion_tx.send(Box::new(move || done(op())));
            }
        }
    }
}

impl RemoteStore for InMemoryStore {
    fn get(&self, path: &str, done: Completion<Option<Document>>) {
        let shared = Arc::clone(&self.shared);
        let owned = path.to_string();
        self.complete(path, done, move || shared.read_doc(&owned));
    }

    fn query(&self, path: &str, field: &str, value: &Value, done: Completion<Vec<Document>>) {
        let shared = Arc::clone(&self.shared);
        let (owned, field, value) = (normalize(path), field.to_string(), value.clone());
        self.complete(path, done, move || shared.query_docs(&owned, &field, &value));
    }

    fn set(&self, path: &str, id: &str, data: Map<String, Value>, done: Completion<()>) {
        let shared = Arc::clone(&self.shared);
        let (collection, id_owned) = (normalize(path), id.to_string());
        self.complete(&join_path(path, id), done, move || {
            shared.write_doc(&collection, &id_owned, data, false).map(|_| ())
        });
    }

    fn update(&self, path: &str, id: &str, partial: Map<String, Value>, done: Completion<()>) {
        let shared = Arc::clone(&self.shared);
        let (collection, id_owned) = (normalize(path), id.to_string());
        self.complete(&join_path(path, id), done, move || {
            shared.write_doc(&collection, &id_owned, partial, true).map(|_| ())
        });
    }

    fn delete(&self, path: &str, id: &str, done: Completion<()>) {
        let shared = Arc::clone(&self.shared);
        let (collection, id_owned) = (normalize(path), id.to_string());
        self.complete(&join_path(path, id), done, move || {
            shared.remove_doc(&collection, &id_owned)
        });
    }

    fn add(&self, path: &str, data: Map<String, Value>, done: Completion<String>) {
        let shared = Arc::clone(&self.shared);
        let collection = normalize(path);
        self.complete(path, done, move || {
            let id = Uuid::new_v4().simple().to_string();
            shared.write_doc(&collection, &id, data, false)?;
            Ok(id)
        });
    }

    fn subscribe(&self, target: StreamTarget, listener: Arc<dyn StreamListener>) -> ListenerHandle {
        let path = target.path().trim_matches('/').to_string();
        if self.shared.fault_for(&path) == Some(Fault::Deny) {
            let err = StoreError::permission_denied(&path);
            let failed = Arc::clone(&listener);
            let _ = self
                .shared
                .delivery_tx
                .send(Box::new(move || failed.on_error(&err)));
        }

        let id = self.shared.next_listener.fetch_add(1, Ordering::Relaxed);
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, ListenerEntry { target, listener });
        debug!(listener_id = id, path = %path, "listener attached");

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        ListenerHandle::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared
                    .listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                debug!(listener_id = id, "listener detached");
            }
        })
    }
}

impl Drop for InMemoryStore {
    fn drop(&mut self) {
        // Close the completion queue so its worker exits. The delivery worker
        // exits once the last `Shared` reference is gone.
        let (dummy_tx, _) = unbounded::<Job>();
        drop(std::mem::replace(&mut self.completion_tx, dummy_tx));

        if let Ok(mut workers) = self.workers.lock() {
            // Detach rather than join: a delivery job may hold the last
            // reference to this store.
            workers.clear();
        }
    }
}

fn spawn_worker(name: &'static str, rx: Receiver<Job>) -> JoinHandle<()> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            while let Ok(job) = rx.recv() {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!(worker = name, "store callback panicked");
                }
            }
        })
        .expect("failed to spawn hivewatch store worker")
}
