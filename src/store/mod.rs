//! Remote document store access.
//!
//! `RemoteStore` is the callback-based contract of the hosted store;
//! `BlockingStore` turns it into bounded synchronous calls and
//! `InMemoryStore` is the in-process implementation used by tests and the
//! replay tool.

mod facade;
mod memory;
mod traits;

pub use facade::BlockingStore;
pub use memory::InMemoryStore;
pub use traits::{
    join_path, split_path, Completion, Document, ListenerHandle, RemoteStore, StreamListener, StreamTarget,
};
