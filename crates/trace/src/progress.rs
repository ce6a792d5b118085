//! Per-project progress event bus (spec §3, §4.10 "Session progress").
//!
//! Every session transition, round boundary, retrieval, and token chunk is
//! broadcast to whichever subscribers (WebSocket handlers, in an outer
//! binary) are watching that project. A slow subscriber never blocks the
//! producer: `publish` gives each subscriber a bounded timeout to accept
//! the event and drops it from the list if it can't keep up.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;
use wenshape_protocol::{ProgressEvent, ProjectId};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(200);

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<ProgressEvent>,
}

/// Process-wide fan-out of [`ProgressEvent`]s, keyed by project.
pub struct ProgressBus {
    subscribers: Mutex<HashMap<ProjectId, Vec<Subscriber>>>,
    channel_capacity: usize,
    send_timeout: Duration,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Registers a new subscriber for `project` and returns its id (for
    /// later [`ProgressBus::unsubscribe`]) and the receiving end.
    pub async fn subscribe(&self, project: ProjectId) -> (Uuid, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let id = Uuid::new_v4();
        let mut subs = self.subscribers.lock().await;
        subs.entry(project).or_default().push(Subscriber { id, tx });
        (id, rx)
    }

    pub async fn unsubscribe(&self, project: &ProjectId, id: Uuid) {
        let mut subs = self.subscribers.lock().await;
        if let Some(list) = subs.get_mut(project) {
            list.retain(|s| s.id != id);
        }
    }

    pub async fn subscriber_count(&self, project: &ProjectId) -> usize {
        self.subscribers
            .lock()
            .await
            .get(project)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Broadcasts `event` to every subscriber of `event.project_id`,
    /// dropping (not blocking on) any subscriber that doesn't drain its
    /// queue within the configured timeout.
    pub async fn publish(&self, event: ProgressEvent) {
        let mut subs = self.subscribers.lock().await;
        let Some(list) = subs.get_mut(&event.project_id) else { return };
        let mut survivors = Vec::with_capacity(list.len());
        for sub in list.drain(..) {
            match tokio::time::timeout(self.send_timeout, sub.tx.send(event.clone())).await {
                Ok(Ok(())) => survivors.push(sub),
                Ok(Err(_)) => {
                    tracing::debug!(subscriber = %sub.id, "progress subscriber channel closed");
                }
                Err(_) => {
                    tracing::warn!(subscriber = %sub.id, "progress subscriber too slow, dropping");
                }
            }
        }
        *list = survivors;
    }
}
