//! Remote store contract.
//!
//! The hosted store is asynchronous: every operation takes a one-shot
//! completion callback, and live queries push changes to a listener until
//! their handle is cancelled. Implementations may invoke callbacks from any
//! thread.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// One-shot completion callback for a store operation.
pub type Completion<T> = Box<dyn FnOnce(Result<T, StoreError>) + Send + 'static>;

/// A document as returned by the store.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    /// Creates a document from its id and body.
    #[must_use]
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self { id: id.into(), data }
    }

    /// Wraps a JSON value, which must be an object.
    pub fn from_value(id: impl Into<String>, value: Value) -> Result<Self, StoreError> {
        let id = id.into();
        match value {
            Value::Object(data) => Ok(Self { id, data }),
            other => Err(StoreError::Decode {
                path: id,
                message: format!("expected an object, got {other}"),
            }),
        }
    }

    /// Decodes the document body into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.data.clone()))
    }

    /// Looks up one top-level field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// What a live listener is attached to.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamTarget {
    /// Every document in a collection.
    Collection { path: String },
    /// Documents in a collection whose `field` equals `value`.
    Filtered {
        path: String,
        field: String,
        value: Value,
    },
}

impl StreamTarget {
    /// Collection path the target watches.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Collection { path } | Self::Filtered { path, .. } => path,
        }
    }

    /// Whether a change to `doc` in `collection` belongs to this target.
    #[must_use]
    pub fn matches(&self, collection: &str, doc: &Document) -> bool {
        match self {
            Self::Collection { path } => path == collection,
            Self::Filtered { path, field, value } => {
                path == collection && doc.field(field) == Some(value)
            }
        }
    }
}

/// Receiver of pushed changes.
pub trait StreamListener: Send + Sync {
    /// Documents that were added or changed.
    fn on_change(&self, docs: &[Document]);

    /// The stream reported a failure. The stream may keep delivering afterwards.
    fn on_error(&self, error: &StoreError);
}

/// Cancellation handle for a live listener.
///
/// Cancelling is idempotent. Dropping the handle cancels the listener.
pub struct ListenerHandle {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ListenerHandle {
    /// Creates a handle that runs `cancel` once.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Detaches the listener. Later calls do nothing.
    pub fn cancel(&self) {
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Whether `cancel` has already run.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Callback-based hierarchical document store.
///
/// Paths are slash separated. A document path is its collection path plus
/// the document id (`hives/H1`).
pub trait RemoteStore: Send + Sync {
    /// Reads one document. Completes with `None` when it does not exist.
    fn get(&self, path: &str, done: Completion<Option<Document>>);

    /// Reads every document in `path` whose `field` equals `value`.
    fn query(&self, path: &str, field: &str, value: &Value, done: Completion<Vec<Document>>);

    /// Creates or replaces a document.
    fn set(&self, path: &str, id: &str, data: Map<String, Value>, done: Completion<()>);

    /// Merges fields into an existing document.
    fn update(&self, path: &str, id: &str, partial: Map<String, Value>, done: Completion<()>);

    /// Removes a document.
    fn delete(&self, path: &str, id: &str, done: Completion<()>);

    /// Creates a document with a generated id and completes with that id.
    fn add(&self, path: &str, data: Map<String, Value>, done: Completion<String>);

    /// Attaches a live listener. Failures arrive through `on_error`.
    fn subscribe(&self, target: StreamTarget, listener: Arc<dyn StreamListener>) -> ListenerHandle;
}

/// Joins a collection path and a document id.
#[must_use]
pub fn join_path(collection: &str, id: &str) -> String {
    format!("{}/{}", collection.trim_end_matches('/'), id)
}

/// Splits a document path into collection path and id.
#[must_use]
pub fn split_path(path: &str) -> Option<(&str, &str)> {
    let (collection, id) = path.trim_matches('/').rsplit_once('/')?;
    if collection.is_empty() || id.is_empty() || collection.split('/').any(str::is_empty) {
        return None;
    }
    Some((collection, id))
}
