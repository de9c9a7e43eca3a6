use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration};
use serde_json::{json, Value};

use hivewatch::monitor::{NotificationChannel, OutboundMessage};
use hivewatch::store::InMemoryStore;
use hivewatch::{HiveConfig, HiveMonitor, ManualClock, NotificationError};

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingChannel {
    fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.subject.clone()).collect()
    }

    fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl NotificationChannel for RecordingChannel {
    fn send(&self, message: &OutboundMessage) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    channel: Arc<RecordingChannel>,
    clock: Arc<ManualClock>,
    monitor: HiveMonitor,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        store
            .seed("hives", "H1", json!({ "name": "Orchard", "ownerId": "u1" }))
            .unwrap();
        store
            .seed("hives", "H2", json!({ "name": "Meadow", "ownerId": "u2", "humMax": 60.0 }))
            .unwrap();
        store
            .seed("users", "u1", json!({ "email": "ada@example.com", "displayName": "Ada" }))
            .unwrap();
        store
            .seed("users", "u2", json!({ "email": "bo@example.com" }))
            .unwrap();

        let channel = Arc::new(RecordingChannel::default());
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_717_200_000, 0).unwrap(),
        ));
        let monitor = HiveMonitor::with_clock(
            HiveConfig::default(),
            store.clone(),
            channel.clone(),
            clock.clone(),
        )
        .unwrap();
        monitor.start();

        Self {
            store,
            channel,
            clock,
            monitor,
        }
    }

    fn push(&self, reading: Value) {
        self.monitor.store().add("readings", reading).unwrap();
        self.store.flush();
    }
}

#[test]
fn lid_open_reading_dispatches_once() {
    let h = Harness::new();

    h.push(json!({ "hiveId": "H1", "lidOpen": true, "temperature": 25.0 }));
    assert_eq!(h.channel.subjects(), vec!["[HiveWatch] Lid open on Orchard"]);

    let sent = h.channel.sent.lock().unwrap();
    assert_eq!(sent[0].to, "ada@example.com");
    assert!(sent[0].body.contains("Temperature: 25.0 °C"));
}

#[test]
fn inhibition_suppresses_until_deactivated() {
    let h = Harness::new();
    let reading = json!({ "hiveId": "H1", "lidOpen": true, "temperature": 25.0 });

    h.monitor.activate_inhibition("H1", 1).unwrap();
    h.push(reading.clone());
    assert!(h.channel.subjects().is_empty());
    assert_eq!(h.monitor.pipeline().suppressed(), 1);

    assert!(h.monitor.deactivate_inhibition("H1").unwrap());
    h.push(reading);
    assert_eq!(h.channel.subjects().len(), 1);
}

#[test]
fn alert_then_inhibit_then_deactivate() {
    let h = Harness::new();
    let reading = json!({ "hiveId": "H1", "lidOpen": true, "temperature": 25.0 });

    h.push(reading.clone());
    assert_eq!(h.channel.subjects().len(), 1);

    h.monitor.activate_inhibition("H1", 1).unwrap();
    h.push(reading.clone());
    assert_eq!(h.channel.subjects().len(), 1);

    assert!(h.monitor.deactivate_inhibition("H1").unwrap());
    h.push(reading);
    assert_eq!(
        h.channel.subjects(),
        vec!["[HiveWatch] Lid open on Orchard", "[HiveWatch] Lid open on Orchard"]
    );
    assert_eq!(h.monitor.pipeline().processed(), 3);
    assert_eq!(h.monitor.pipeline().suppressed(), 1);
}

#[test]
fn inhibition_is_scoped_to_one_hive() {
    let h = Harness::new();
    h.monitor.activate_inhibition("H1", 4).unwrap();

    h.push(json!({ "hiveId": "H1", "lidOpen": true }));
    h.push(json!({ "hiveId": "H2", "lidOpen": true }));

    assert_eq!(h.channel.subjects(), vec!["[HiveWatch] Lid open on Meadow"]);
}

#[test]
fn inhibition_lapses_with_time() {
    let h = Harness::new();
    h.monitor.activate_inhibition("H1", 2).unwrap();

    h.clock.advance(Duration::minutes(90));
    let status = h.monitor.inhibition_status("H1").unwrap();
    assert!(status.inhibited);
    assert_eq!(status.hours_remaining, Some(1));
    h.push(json!({ "hiveId": "H1", "lidOpen": true }));
    assert!(h.channel.subjects().is_empty());

    h.clock.advance(Duration::minutes(30));
    h.push(json!({ "hiveId": "H1", "lidOpen": true }));
    assert_eq!(h.channel.subjects().len(), 1);
    assert!(h.monitor.active_inhibitions().is_empty());
}

#[test]
fn hive_record_bounds_apply() {
    let h = Harness::new();

    // 65 % is fine by default but above H2's own maximum.
    h.push(json!({ "hiveId": "H1", "humidity": 65.0 }));
    assert!(h.channel.subjects().is_empty());

    h.push(json!({ "hiveId": "H2", "humidity": 65.0 }));
    assert_eq!(h.channel.subjects(), vec!["[HiveWatch] Humidity out of range on Meadow"]);
    let sent = h.channel.sent.lock().unwrap();
    assert!(sent[0].body.contains("Humidity 65.0 % outside 40.0-60.0 %"));
}

#[test]
fn monitored_hive_is_not_evaluated_twice() {
    let h = Harness::new();
    assert!(h.monitor.start_monitoring("H1").unwrap());

    h.push(json!({ "hiveId": "H1", "lidOpen": true }));
    assert_eq!(h.channel.subjects().len(), 1);
    assert_eq!(h.monitor.pipeline().processed(), 1);

    h.channel.clear();
    assert!(h.monitor.stop_monitoring("H1").unwrap());
    h.push(json!({ "hiveId": "H1", "lidOpen": true }));
    assert_eq!(h.channel.subjects().len(), 1);
}

#[test]
fn unknown_hive_is_not_fatal() {
    let h = Harness::new();

    h.push(json!({ "hiveId": "H404", "lidOpen": true }));
    h.push(json!({ "hiveId": "H1", "lidOpen": true }));

    assert_eq!(h.channel.subjects(), vec!["[HiveWatch] Lid open on Orchard"]);
    assert_eq!(h.monitor.pipeline().processed(), 2);
}

#[test]
fn stream_errors_keep_the_service_running() {
    let h = Harness::new();

    h.store.emit_stream_error(
        "readings",
        hivewatch::StoreError::unavailable("readings", "connection reset"),
    );
    h.store.flush();

    h.push(json!({ "hiveId": "H1", "lidOpen": true }));
    assert_eq!(h.channel.subjects().len(), 1);
}
