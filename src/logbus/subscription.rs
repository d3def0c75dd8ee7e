use crate::logbus::{lock_channels, Channels, LogEntry};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;

/// An item delivered to a log stream subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Entry(LogEntry),
    /// Emitted after a period of silence so idle connections stay open
    Keepalive { timestamp: DateTime<Utc> },
}

/// A live view of one job's log stream
///
/// Yields the ring replay first, then live entries. Dropping the
/// subscription unregisters it from the bus.
pub struct LogSubscription {
    job_id: String,
    id: u64,
    replay: VecDeque<LogEntry>,
    receiver: mpsc::UnboundedReceiver<LogEntry>,
    keepalive: Duration,
    channels: Channels,
}

impl LogSubscription {
    pub(crate) fn new(
        job_id: String,
        id: u64,
        replay: VecDeque<LogEntry>,
        receiver: mpsc::UnboundedReceiver<LogEntry>,
        keepalive: Duration,
        channels: Channels,
    ) -> Self {
        Self {
            job_id,
            id,
            replay,
            receiver,
            keepalive,
            channels,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Waits for the next event
    ///
    /// Returns `None` once the job's stream has been cleared.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if let Some(entry) = self.replay.pop_front() {
            return Some(StreamEvent::Entry(entry));
        }

        match tokio::time::timeout(self.keepalive, self.receiver.recv()).await {
            Ok(Some(entry)) => Some(StreamEvent::Entry(entry)),
            Ok(None) => None,
            Err(_) => Some(StreamEvent::Keepalive {
                timestamp: Utc::now(),
            }),
        }
    }

    /// Returns the next entry if one is ready, without waiting
    pub fn try_next(&mut self) -> Option<LogEntry> {
        self.replay
            .pop_front()
            .or_else(|| self.receiver.try_recv().ok())
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        let mut channels = lock_channels(&self.channels);
        if let Some(channel) = channels.get_mut(&self.job_id) {
            channel.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}
