//! Blocking facade over the callback-based store.
//!
//! Every call hands the store a one-shot completion that writes into its own
//! single-slot channel, then waits on that channel with a timeout. Concurrent
//! calls share nothing but the store handle.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{HiveResult, StoreError, ValidationError};

use super::traits::{join_path, split_path, Completion, Document, RemoteStore};

/// Synchronous request/response access to a `RemoteStore`.
#[derive(Clone)]
pub struct BlockingStore {
    store: Arc<dyn RemoteStore>,
    timeout: Duration,
}

impl std::fmt::Debug for BlockingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BlockingStore {
    /// Wraps `store`, bounding every call by `timeout`.
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Wait bound applied to every call.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The wrapped store, for subscribing listeners.
    #[must_use]
    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Reads one document.
    pub fn get(&self, path: &str) -> HiveResult<Option<Document>> {
        validate_document_path(path)?;
        self.wait(path, |done| self.store.get(path, done))
    }

    /// Reads one document and decodes it.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> HiveResult<Option<T>> {
        let Some(doc) = self.get(path)? else {
            return Ok(None);
        };
        let record = doc.decode().map_err(|e| StoreError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(record))
    }

    /// Reads every document in `path` whose `field` equals `value`.
    pub fn get_where(&self, path: &str, field: &str, value: impl Into<Value>) -> HiveResult<Vec<Document>> {
        validate_collection_path(path)?;
        let value = value.into();
        self.wait(path, |done| self.store.query(path, field, &value, done))
    }

    /// Creates or replaces `path/id`.
    pub fn set(&self, path: &str, id: &str, data: Value) -> HiveResult<()> {
        validate_collection_path(path)?;
        let full = join_path(path, id);
        validate_document_path(&full)?;
        let data = into_object(&full, data)?;
        self.wait(&full, |done| self.store.set(path, id, data, done))
    }

    /// Merges `partial` into `path/id`.
    pub fn update(&self, path: &str, id: &str, partial: Value) -> HiveResult<()> {
        validate_collection_path(path)?;
        let full = join_path(path, id);
        validate_document_path(&full)?;
        let partial = into_object(&full, partial)?;
        self.wait(&full, |done| self.store.update(path, id, partial, done))
    }

    /// Removes `path/id`.
    pub fn delete(&self, path: &str, id: &str) -> HiveResult<()> {
        validate_collection_path(path)?;
        let full = join_path(path, id);
        validate_document_path(&full)?;
        self.wait(&full, |done| self.store.delete(path, id, done))
    }

    /// Creates a document under `path` and returns its generated id.
    pub fn add(&self, path: &str, data: Value) -> HiveResult<String> {
        validate_collection_path(path)?;
        let data = into_object(path, data)?;
        self.wait(path, |done| self.store.add(path, data, done))
    }

    fn wait<T, F>(&self, path: &str, start: F) -> HiveResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Completion<T>),
    {
        let (tx, rx) = bounded::<Result<T, StoreError>>(1);
        start(Box::new(move |result| {
            // The caller may have timed out and dropped the receiver.
            let _ = tx.send(result);
        }));

        match rx.recv_timeout(self.timeout) {
            Ok(result) => {
                if let Err(err) = &result {
                    debug!(path, error = %err, "store call failed");
                }
                Ok(result?)
            }
            Err(RecvTimeoutError::Timeout) => {
                let duration_ms = self.timeout.as_millis().min(u128::from(u64::MAX)) as u64;
                warn!(path, duration_ms, "store call timed out");
                Err(StoreError::Timeout {
                    path: path.to_string(),
                    duration_ms,
                }
                .into())
            }
            Err(RecvTimeoutError::Disconnected) => Err(StoreError::Disconnected {
                path: path.to_string(),
            }
            .into()),
        }
    }
}

fn into_object(path: &str, value: Value) -> Result<Map<String, Value>, ValidationError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ValidationError::NotAnObject {
            path: path.to_string(),
        }),
    }
}

fn validate_document_path(path: &str) -> Result<(), ValidationError> {
    if split_path(path).is_none() {
        return Err(ValidationError::InvalidPath {
            path: path.to_string(),
            reason: "expected <collection>/<id>".to_string(),
        });
    }
    Ok(())
}

fn validate_collection_path(path: &str) -> Result<(), ValidationError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() || trimmed.split('/').any(str::is_empty) {
        return Err(ValidationError::InvalidPath {
            path: path.to_string(),
            reason: "empty path segment".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::thread;

    use serde_json::json;

    use super::*;
    use crate::error::HiveError;
    use crate::store::traits::{ListenerHandle, StreamListener, StreamTarget};

    /// Store whose completions are driven by the test.
    #[derive(Default)]
    struct ScriptedStore {
        parked: Mutex<Vec<Completion<Option<Document>>>>,
    }

    impl RemoteStore for ScriptedStore {
        fn get(&self, path: &str, done: Completion<Option<Document>>) {
            match path {
                "hives/now" => done(Ok(Some(Document::new("now", Map::new())))),
                "hives/later" => {
                    thread::spawn(move || {
                        thread::sleep(Duration::from_millis(20));
                        done(Ok(None));
                    });
                }
                "hives/denied" => done(Err(StoreError::permission_denied(path))),
                "hives/dropped" => drop(done),
                _ => self.parked.lock().unwrap().push(done),
            }
        }

        fn query(&self, _path: &str, _field: &str, _value: &Value, done: Completion<Vec<Document>>) {
            done(Ok(vec![Document::new("a", Map::new())]));
        }

        fn set(&self, _path: &str, _id: &str, _data: Map<String, Value>, done: Completion<()>) {
            done(Ok(()));
        }

        fn update(&self, _path: &str, _id: &str, _partial: Map<String, Value>, done: Completion<()>) {
            done(Ok(()));
        }

        fn delete(&self, _path: &str, _id: &str, done: Completion<()>) {
            done(Ok(()));
        }

        fn add(&self, _path: &str, _data: Map<String, Value>, done: Completion<String>) {
            done(Ok("generated".to_string()));
        }

        fn subscribe(&self, _target: StreamTarget, _listener: Arc<dyn StreamListener>) -> ListenerHandle {
            ListenerHandle::new(|| {})
        }
    }

    fn facade(timeout_ms: u64) -> BlockingStore {
        BlockingStore::new(Arc::new(ScriptedStore::default()), Duration::from_millis(timeout_ms))
    }

    #[test]
    fn test_inline_and_deferred_completions() {
        let store = facade(1_000);
        assert!(store.get("hives/now").unwrap().is_some());
        assert!(store.get("hives/later").unwrap().is_none());
        assert_eq!(store.add("hives", json!({ "name": "x" })).unwrap(), "generated");
        assert_eq!(store.get_where("hives", "ownerId", "u1").unwrap().len(), 1);
    }

    #[test]
    fn test_remote_error_propagates() {
        let err = facade(1_000).get("hives/denied").unwrap_err();
        assert!(matches!(err, HiveError::Store(StoreError::Remote { .. })));
    }

    #[test]
    fn test_dropped_completion_is_disconnected() {
        let err = facade(1_000).get("hives/dropped").unwrap_err();
        assert!(matches!(err, HiveError::Store(StoreError::Disconnected { .. })));
    }

    #[test]
    fn test_never_completing_call_times_out() {
        let store = facade(50);
        let started = std::time::Instant::now();
        let err = store.get("hives/never").unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_inputs_rejected_before_calling_store() {
        let store = facade(50);
        assert!(store.get("hives").unwrap_err().is_validation());
        assert!(store.set("hives", "H1", json!(3)).unwrap_err().is_validation());
        assert!(store.delete("", "H1").unwrap_err().is_validation());
    }
}
