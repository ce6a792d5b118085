//! The process-wide trace collector (spec §4.10 "Global trace").
//!
//! A capped ring buffer of [`TraceEvent`]s plus a subscriber set, with
//! incremental rollup counters updated on every `record` call so a
//! `/ws/trace` handler (outside this crate) can read current stats without
//! re-scanning the buffer.

use std::collections::VecDeque;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;
use wenshape_protocol::{TraceEvent, TraceEventType};

const DEFAULT_RING_CAPACITY: usize = 1000;
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Incrementally-maintained rollup of trace events (spec §4.10).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TraceStats {
    pub llm_requests: u64,
    pub llm_prompt_tokens: u64,
    pub llm_completion_tokens: u64,
    pub llm_total_tokens: u64,
    pub context_selects: u64,
    pub selected_items: u64,
    pub input_tokens: u64,
    pub context_compresses: u64,
    pub saved_tokens: u64,
}

impl TraceStats {
    fn apply(&mut self, event: &TraceEvent) {
        match event.kind {
            TraceEventType::LlmRequest => {
                self.llm_requests += 1;
                self.llm_prompt_tokens += field_u64(&event.data, "prompt_tokens");
                self.llm_completion_tokens += field_u64(&event.data, "completion_tokens");
                self.llm_total_tokens += field_u64(&event.data, "total_tokens");
            }
            TraceEventType::ContextSelect => {
                self.context_selects += 1;
                self.selected_items += field_u64(&event.data, "selected_items");
                self.input_tokens += field_u64(&event.data, "input_tokens");
            }
            TraceEventType::ContextCompress => {
                self.context_compresses += 1;
                self.saved_tokens += field_u64(&event.data, "saved_tokens");
            }
            _ => {}
        }
    }
}

fn field_u64(data: &serde_json::Value, key: &str) -> u64 {
    data.get(key).and_then(|v| v.as_u64()).unwrap_or(0)
}

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<TraceEvent>,
}

/// Process-wide trace bus: agent lifecycle, tool calls, LLM requests,
/// context select/compress/health checks, handoffs, diffs.
pub struct TraceCollector {
    ring: Mutex<VecDeque<TraceEvent>>,
    stats: Mutex<TraceStats>,
    subscribers: Mutex<Vec<Subscriber>>,
    capacity: usize,
}

impl Default for TraceCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceCollector {
    pub fn new() -> Self {
        Self {
            ring: Mutex::new(VecDeque::with_capacity(DEFAULT_RING_CAPACITY)),
            stats: Mutex::new(TraceStats::default()),
            subscribers: Mutex::new(Vec::new()),
            capacity: DEFAULT_RING_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Records `event`: pushes it onto the ring buffer (evicting the
    /// oldest entry past capacity), updates the rollup, and fans it out to
    /// subscribers. Ordering is strict within one emitter (spec §4.10);
    /// this method serializes on the ring's mutex so concurrent emitters
    /// simply interleave their calls.
    pub async fn record(&self, event: TraceEvent) {
        {
            let mut ring = self.ring.lock().await;
            if ring.len() >= self.capacity {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }
        {
            let mut stats = self.stats.lock().await;
            stats.apply(&event);
        }
        let mut subs = self.subscribers.lock().await;
        let mut survivors = Vec::with_capacity(subs.len());
        for sub in subs.drain(..) {
            if sub.tx.try_send(event.clone()).is_ok() {
                survivors.push(sub);
            } else {
                tracing::debug!(subscriber = %sub.id, "trace subscriber dropped (closed or full)");
            }
        }
        *subs = survivors;
    }

    pub async fn stats(&self) -> TraceStats {
        self.stats.lock().await.clone()
    }

    /// Subscribes to the live event stream. The initial backlog (every
    /// [`TraceEventType::AgentStart`] not yet matched by an `AgentEnd`
    /// for the same `agent_name`) is returned alongside the receiver so a
    /// fresh `/ws/trace` connection can seed its view of active agents.
    pub async fn subscribe(&self) -> (Uuid, Vec<TraceEvent>, mpsc::Receiver<TraceEvent>) {
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let id = Uuid::new_v4();
        let backlog = self.active_agent_backlog().await;
        let mut subs = self.subscribers.lock().await;
        subs.push(Subscriber { id, tx });
        (id, backlog, rx)
    }

    pub async fn unsubscribe(&self, id: Uuid) {
        let mut subs = self.subscribers.lock().await;
        subs.retain(|s| s.id != id);
    }

    async fn active_agent_backlog(&self) -> Vec<TraceEvent> {
        let ring = self.ring.lock().await;
        let mut started: Vec<TraceEvent> = Vec::new();
        for event in ring.iter() {
            match event.kind {
                TraceEventType::AgentStart => started.push(event.clone()),
                TraceEventType::AgentEnd => {
                    started.retain(|s| s.agent_name != event.agent_name);
                }
                _ => {}
            }
        }
        started
    }

    pub async fn snapshot(&self) -> Vec<TraceEvent> {
        self.ring.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.ring.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn llm_event(total: u64, prompt: u64, completion: u64) -> TraceEvent {
        TraceEvent::new(
            TraceEventType::LlmRequest,
            "writer",
            json!({"total_tokens": total, "prompt_tokens": prompt, "completion_tokens": completion}),
        )
    }

    #[tokio::test]
    async fn ring_buffer_evicts_oldest_past_capacity() {
        let collector = TraceCollector::new().with_capacity(2);
        collector.record(llm_event(1, 1, 0)).await;
        collector.record(llm_event(2, 2, 0)).await;
        collector.record(llm_event(3, 3, 0)).await;
        let snapshot = collector.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(field_u64(&snapshot[0].data, "total_tokens"), 2);
    }

    #[tokio::test]
    async fn llm_request_rolls_up_token_counts() {
        let collector = TraceCollector::new();
        collector.record(llm_event(100, 60, 40)).await;
        collector.record(llm_event(50, 30, 20)).await;
        let stats = collector.stats().await;
        assert_eq!(stats.llm_requests, 2);
        assert_eq!(stats.llm_total_tokens, 150);
        assert_eq!(stats.llm_prompt_tokens, 90);
        assert_eq!(stats.llm_completion_tokens, 60);
    }

    #[tokio::test]
    async fn context_compress_accumulates_saved_tokens() {
        let collector = TraceCollector::new();
        collector
            .record(TraceEvent::new(
                TraceEventType::ContextCompress,
                "compressor",
                json!({"saved_tokens": 400}),
            ))
            .await;
        let stats = collector.stats().await;
        assert_eq!(stats.saved_tokens, 400);
        assert_eq!(stats.context_compresses, 1);
    }

    #[tokio::test]
    async fn subscriber_receives_recorded_events() {
        let collector = TraceCollector::new();
        let (_id, backlog, mut rx) = collector.subscribe().await;
        assert!(backlog.is_empty());
        collector.record(llm_event(10, 5, 5)).await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, TraceEventType::LlmRequest);
    }

    #[tokio::test]
    async fn backlog_seeds_unmatched_agent_starts() {
        let collector = TraceCollector::new();
        collector
            .record(TraceEvent::new(TraceEventType::AgentStart, "writer", json!({})))
            .await;
        collector
            .record(TraceEvent::new(TraceEventType::AgentStart, "editor", json!({})))
            .await;
        collector
            .record(TraceEvent::new(TraceEventType::AgentEnd, "writer", json!({})))
            .await;
        let (_id, backlog, _rx) = collector.subscribe().await;
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].agent_name, "editor");
    }
}
