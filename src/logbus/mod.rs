//! Job log and notification bus
//!
//! Every crawl step is published here. An entry lands in a bounded per-job
//! ring (for late subscribers), is pushed to live subscribers, and is
//! persisted to the durable log. Subscribers first receive a replay of the
//! ring, then live entries, with keepalive ticks during silence.

mod entry;
mod subscription;

pub use entry::{LogEntry, LogLevel};
pub use subscription::{LogSubscription, StreamEvent};

use crate::config::LoggingConfig;
use crate::storage::{self, NotificationKind, SharedStorage, StorageResult};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// In-memory state of one job's stream
#[derive(Default)]
pub(crate) struct JobChannel {
    ring: VecDeque<LogEntry>,
    subscribers: Vec<(u64, mpsc::UnboundedSender<LogEntry>)>,
}

pub(crate) type Channels = Arc<Mutex<HashMap<String, JobChannel>>>;

pub(crate) fn lock_channels(channels: &Channels) -> MutexGuard<'_, HashMap<String, JobChannel>> {
    // Ring state stays consistent even if a holder panicked
    channels.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-scoped log bus shared by the engine, the scheduler and observers
pub struct LogBus {
    channels: Channels,
    storage: SharedStorage,
    ring_capacity: usize,
    keepalive: Duration,
    next_subscriber: AtomicU64,
}

impl LogBus {
    /// Creates a bus using the `[logging]` configuration
    pub fn new(storage: SharedStorage, config: &LoggingConfig) -> Self {
        Self::with_settings(
            storage,
            config.ring_capacity,
            Duration::from_secs(config.keepalive_secs),
        )
    }

    pub fn with_settings(storage: SharedStorage, ring_capacity: usize, keepalive: Duration) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            storage,
            ring_capacity: ring_capacity.max(1),
            keepalive,
            next_subscriber: AtomicU64::new(1),
        }
    }

    /// Publishes an entry to the ring, live subscribers and the durable log
    ///
    /// Never fails: a persistence error is reported through `tracing` and
    /// the entry still reaches the ring and subscribers.
    pub fn publish(
        &self,
        job_id: &str,
        level: LogLevel,
        message: impl Into<String>,
        detail: Option<Value>,
    ) {
        let entry = LogEntry::new(job_id, level, message, detail);
        mirror_to_tracing(&entry);

        // Held through the persist so ring, live and durable order agree
        let mut channels = lock_channels(&self.channels);
        let channel = channels.entry(job_id.to_string()).or_default();

        if channel.ring.len() >= self.ring_capacity {
            channel.ring.pop_front();
        }
        channel.ring.push_back(entry.clone());

        channel
            .subscribers
            .retain(|(_, sender)| sender.send(entry.clone()).is_ok());

        let persisted = storage::lock(&self.storage).and_then(|mut s| s.append_log(&entry));
        if let Err(e) = persisted {
            tracing::warn!("Failed to persist log entry for job {}: {}", job_id, e);
        }
    }

    pub fn debug(&self, job_id: &str, message: impl Into<String>) {
        self.publish(job_id, LogLevel::Debug, message, None);
    }

    pub fn info(&self, job_id: &str, message: impl Into<String>) {
        self.publish(job_id, LogLevel::Info, message, None);
    }

    pub fn success(&self, job_id: &str, message: impl Into<String>) {
        self.publish(job_id, LogLevel::Success, message, None);
    }

    pub fn warning(&self, job_id: &str, message: impl Into<String>) {
        self.publish(job_id, LogLevel::Warning, message, None);
    }

    pub fn error(&self, job_id: &str, message: impl Into<String>) {
        self.publish(job_id, LogLevel::Error, message, None);
    }

    /// Subscribes to a job's stream
    ///
    /// The ring snapshot and the registration happen under one lock, so no
    /// entry is missed or delivered twice between replay and live delivery.
    pub fn subscribe(&self, job_id: &str) -> LogSubscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        let replay = {
            let mut channels = lock_channels(&self.channels);
            let channel = channels.entry(job_id.to_string()).or_default();
            channel.subscribers.push((id, sender));
            channel.ring.clone()
        };

        LogSubscription::new(
            job_id.to_string(),
            id,
            replay,
            receiver,
            self.keepalive,
            Arc::clone(&self.channels),
        )
    }

    /// Number of live subscribers of a job
    pub fn subscriber_count(&self, job_id: &str) -> usize {
        lock_channels(&self.channels)
            .get(job_id)
            .map(|c| c.subscribers.len())
            .unwrap_or(0)
    }

    /// Snapshot of the in-memory ring, oldest first
    pub fn buffered(&self, job_id: &str) -> Vec<LogEntry> {
        lock_channels(&self.channels)
            .get(job_id)
            .map(|c| c.ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Reads a page of the durable log
    ///
    /// # Arguments
    ///
    /// * `job_id` - The job whose log to read
    /// * `limit` - Maximum number of entries
    /// * `since_id` - Only entries with a greater id, ascending
    pub fn read_page(
        &self,
        job_id: &str,
        limit: usize,
        since_id: Option<i64>,
    ) -> StorageResult<Vec<LogEntry>> {
        storage::lock(&self.storage)?.read_logs(job_id, limit, since_id)
    }

    /// Drops a job's ring and durable log; live subscriptions end
    pub fn clear(&self, job_id: &str) -> StorageResult<usize> {
        lock_channels(&self.channels).remove(job_id);
        storage::lock(&self.storage)?.clear_logs(job_id)
    }

    /// Records a notification for a job
    pub fn notify(
        &self,
        job_id: &str,
        kind: NotificationKind,
        message: &str,
    ) -> StorageResult<String> {
        storage::lock(&self.storage)?.create_notification(Some(job_id), kind, message)
    }
}

/// Tracing target of mirrored job log entries
pub const JOB_LOG_TARGET: &str = "api_harvest::joblog";

fn mirror_to_tracing(entry: &LogEntry) {
    let job_id = entry.job_id.as_str();
    match entry.level {
        LogLevel::Debug => tracing::debug!(target: JOB_LOG_TARGET, job_id, "{}", entry.message),
        LogLevel::Info | LogLevel::Success => {
            tracing::info!(target: JOB_LOG_TARGET, job_id, "{}", entry.message)
        }
        LogLevel::Warning => tracing::warn!(target: JOB_LOG_TARGET, job_id, "{}", entry.message),
        LogLevel::Error => tracing::error!(target: JOB_LOG_TARGET, job_id, "{}", entry.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{shared, SqliteStorage};

    fn create_bus(capacity: usize) -> LogBus {
        let storage = shared(SqliteStorage::new_in_memory().unwrap());
        LogBus::with_settings(storage, capacity, Duration::from_secs(30))
    }

    #[test]
    fn test_concurrent_publishers_agree_on_order() {
        let bus = create_bus(1000);

        std::thread::scope(|scope| {
            for publisher in 0..4 {
                let bus = &bus;
                scope.spawn(move || {
                    for i in 0..50 {
                        bus.info("job-1", format!("publisher {} entry {}", publisher, i));
                    }
                });
            }
        });

        let ring: Vec<String> = bus.buffered("job-1").into_iter().map(|e| e.message).collect();
        let durable: Vec<String> = bus
            .read_page("job-1", 1000, None)
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(ring.len(), 200);
        assert_eq!(ring, durable);
    }

    #[test]
    fn test_ring_keeps_last_entries_durable_log_keeps_all() {
        let bus = create_bus(3);
        for i in 0..5 {
            bus.info("job", format!("entry {}", i));
        }

        let ring: Vec<_> = bus.buffered("job").into_iter().map(|e| e.message).collect();
        assert_eq!(ring, vec!["entry 2", "entry 3", "entry 4"]);

        let durable = bus.read_page("job", 100, None).unwrap();
        assert_eq!(durable.len(), 5);
        assert_eq!(durable[0].message, "entry 0");
    }

    #[test]
    fn test_jobs_are_isolated() {
        let bus = create_bus(10);
        bus.info("a", "for a");
        bus.warning("b", "for b");

        assert_eq!(bus.buffered("a").len(), 1);
        assert_eq!(bus.buffered("b")[0].level, LogLevel::Warning);
        assert!(bus.buffered("c").is_empty());
    }

    #[test]
    fn test_clear() {
        let bus = create_bus(10);
        bus.info("job", "one");
        bus.error("job", "two");

        assert_eq!(bus.clear("job").unwrap(), 2);
        assert!(bus.buffered("job").is_empty());
        assert!(bus.read_page("job", 10, None).unwrap().is_empty());
    }

    #[test]
    fn test_notify() {
        let storage = shared(SqliteStorage::new_in_memory().unwrap());
        let bus = LogBus::with_settings(storage.clone(), 10, Duration::from_secs(30));
        bus.notify("job", NotificationKind::Success, "done").unwrap();

        let notifications = storage::lock(&storage)
            .unwrap()
            .list_notifications(false, 50)
            .unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].job_id.as_deref(), Some("job"));
    }

    #[tokio::test]
    async fn test_late_subscriber_replays_then_receives_live() {
        let bus = create_bus(10);
        bus.info("job", "first");
        bus.success("job", "second");

        let mut subscription = bus.subscribe("job");
        bus.debug("job", "third");

        let mut messages = Vec::new();
        for _ in 0..3 {
            match subscription.next().await {
                Some(StreamEvent::Entry(entry)) => messages.push(entry.message),
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_removed() {
        let bus = create_bus(10);
        let subscription = bus.subscribe("job");
        let _other = bus.subscribe("job");
        assert_eq!(bus.subscriber_count("job"), 2);

        drop(subscription);
        assert_eq!(bus.subscriber_count("job"), 1);

        bus.info("job", "still delivered");
        assert_eq!(bus.subscriber_count("job"), 1);
    }

    #[tokio::test]
    async fn test_keepalive_on_silence() {
        let storage = shared(SqliteStorage::new_in_memory().unwrap());
        let bus = LogBus::with_settings(storage, 10, Duration::from_millis(20));
        let mut subscription = bus.subscribe("quiet");

        match subscription.next().await {
            Some(StreamEvent::Keepalive { .. }) => {}
            other => panic!("expected keepalive, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clear_ends_live_subscription() {
        let bus = create_bus(10);
        let mut subscription = bus.subscribe("job");
        bus.clear("job").unwrap();
        assert!(subscription.next().await.is_none());
    }
}
