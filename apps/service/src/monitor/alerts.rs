//! Alert queue and fan-out.
//!
//! Schedulers enqueue alert events; a single consumer task renders each
//! one and delivers the text to every registered subscriber. Delivery is
//! best-effort per subscriber, and messages longer than the notification
//! channel's limit are split before transmission.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::lock;

/// Maximum characters per outgoing message (chat transport limit).
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Kind of state transition an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Down,
    PersistentDown,
    Recovered,
}

/// A host state transition worth telling someone about.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub group: String,
    pub address: IpAddr,
    pub name: String,
    pub raised_at: DateTime<Local>,
}

impl AlertEvent {
    pub fn new(kind: AlertKind, group: &str, address: IpAddr, name: String) -> Self {
        Self { kind, group: group.to_string(), address, name, raised_at: Local::now() }
    }

    /// Human-readable alert text, one message per event.
    pub fn render(&self) -> String {
        let group = self.group.to_uppercase();
        let stamp = self.raised_at.format("%Y-%m-%d %H:%M:%S");
        match self.kind {
            AlertKind::Down => format!(
                "🚨 [{group}] ALERT\n{} ({}) is not responding.\n{stamp}",
                self.name, self.address
            ),
            AlertKind::PersistentDown => format!(
                "🚨 [{group}] PERSISTENT ALERT\n{} ({}) is still not responding.\n{stamp}",
                self.name, self.address
            ),
            AlertKind::Recovered => format!(
                "✅ [{group}] RECOVERED\n{} ({}) is responding again.\n{stamp}",
                self.name, self.address
            ),
        }
    }
}

/// Opaque handle for a registered notification sink.
pub type SubscriberId = u64;

type Subscribers = Arc<Mutex<HashMap<SubscriberId, mpsc::UnboundedSender<String>>>>;

/// Queue plus fan-out to the currently registered subscribers.
///
/// The consumer blocks on the queue; it wakes on enqueue and exits when
/// the dispatcher is dropped. With no subscribers a message is discarded
/// after the fan-out attempt.
pub struct AlertDispatcher {
    tx: mpsc::UnboundedSender<AlertEvent>,
    subscribers: Subscribers,
    next_id: AtomicU64,
    _consumer: tokio::task::JoinHandle<()>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AlertEvent>();
        let subscribers: Subscribers = Arc::new(Mutex::new(HashMap::new()));

        let sinks = Arc::clone(&subscribers);
        let consumer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let text = event.render();
                // Snapshot the subscriber set so delivery never holds the lock.
                let targets: Vec<(SubscriberId, mpsc::UnboundedSender<String>)> =
                    lock(&sinks).iter().map(|(id, tx)| (*id, tx.clone())).collect();

                if targets.is_empty() {
                    debug!(group = %event.group, "alert dropped, no subscribers");
                    continue;
                }

                for chunk in split_message(&text, MAX_MESSAGE_LEN) {
                    for (id, sink) in &targets {
                        if sink.send(chunk.to_string()).is_err() {
                            warn!(subscriber = id, "alert delivery failed");
                        }
                    }
                }
            }
        });

        Self { tx, subscribers, next_id: AtomicU64::new(1), _consumer: consumer }
    }

    /// Push an alert onto the queue. Send only fails once the consumer is
    /// gone, which happens at shutdown; the alert is moot by then.
    pub fn enqueue(&self, event: AlertEvent) {
        let _ = self.tx.send(event);
    }

    /// Register a notification sink; returns its id and the message stream.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        lock(&self.subscribers).remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

impl Default for AlertDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Split `text` into chunks of at most `max_chars` characters, always on
/// valid char boundaries.
fn split_message(text: &str, max_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() || chunks.is_empty() {
        chunks.push(&text[start..]);
    }
    chunks
}
