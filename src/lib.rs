//! # HiveWatch - Reactive alerting for connected beehives
//!
//! HiveWatch listens to sensor readings pushed by a remote document store,
//! classifies each one against per-hive bounds and notifies the hive's owner
//! when something is wrong, unless alerts for that hive are inhibited.
//!
//! ## Core Concepts
//!
//! - **Reading**: one sensor sample for one hive
//! - **AlertCondition**: an anomaly derived from a reading (lid open, out-of-range temperature or humidity)
//! - **Subscription**: a live listener on the readings collection, global or per hive
//! - **InhibitionWindow**: a time-boxed suppression of alerts for one hive
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use hivewatch::monitor::LogChannel;
//! use hivewatch::store::InMemoryStore;
//! use hivewatch::{HiveConfig, HiveMonitor};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let monitor = HiveMonitor::new(HiveConfig::default(), store, Arc::new(LogChannel))?;
//! monitor.start();
//! monitor.activate_inhibition("H1", 2)?;
//! # Ok::<(), hivewatch::HiveError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

// Core types
pub mod config;
pub mod entity;
pub mod error;
pub mod reading;
pub mod time;

// Store access and monitoring
pub mod monitor;
pub mod service;
pub mod store;

pub use config::HiveConfig;
pub use entity::{Account, EntityId, Hive};
pub use error::{HiveError, HiveResult, NotificationError, StoreError, ValidationError};
pub use monitor::{AlertCondition, InhibitionStatus, InhibitionWindow, Thresholds};
pub use reading::Reading;
pub use service::HiveMonitor;
pub use time::{Clock, ManualClock, SystemClock};
