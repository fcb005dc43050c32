//! Status fan-out for running analyses.
//!
//! The broadcaster relays [`StatusEvent`]s from the pipeline runner to any
//! number of subscribers, one channel per analysis. It caches no
//! authoritative state: the store remains the source of truth, and a
//! subscriber that misses events (or connects late) re-reads the store.
//!
//! Terminal handling: publishing an event with `final: true` tears the
//! channel down, so subscribers connecting afterwards find no channel and
//! fall back to fetching current state directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::storage::AnalysisStatus;

/// Per-subscriber buffer; slow subscribers lag rather than block publishers
const CHANNEL_CAPACITY: usize = 64;

/// One status update published by the pipeline runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Analysis identifier.
    pub id: String,
    /// Status at the time of the event.
    pub status: AnalysisStatus,
    /// Display name of the agent now running, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_agent: Option<String>,
    /// Deterministic display progress, 0-100.
    pub progress_percentage: u8,
    /// Steps completed so far.
    pub completed_steps: usize,
    /// Human-readable progress line.
    pub latest_update: String,
    /// True exactly once per analysis, on the terminal event.
    #[serde(rename = "final")]
    pub is_final: bool,
}

/// Fan-out of status events to subscribers, keyed by analysis id.
pub struct StatusBroadcaster {
    channels: RwLock<HashMap<String, broadcast::Sender<StatusEvent>>>,
}

impl StatusBroadcaster {
    /// Create an empty broadcaster
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Open a channel for a newly created analysis
    pub fn register(&self, analysis_id: &str) {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        self.channels
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(analysis_id.to_string(), tx);
    }

    /// Deliver an event to all active subscribers for its analysis.
    ///
    /// Fire-and-forget: send errors (no subscribers) are ignored and the
    /// caller is never blocked. A final event removes the channel so no
    /// further events can be delivered for that analysis.
    pub fn publish(&self, event: StatusEvent) {
        let is_final = event.is_final;
        let id = event.id.clone();

        let sender = {
            let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
            channels.get(&id).cloned()
        };

        if let Some(tx) = sender {
            let _ = tx.send(event);
        } else {
            debug!(analysis_id = %id, "No channel for status event (already terminal?)");
        }

        if is_final {
            self.channels
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
        }
    }

    /// Subscribe to an analysis's events.
    ///
    /// Returns `None` when the channel no longer exists (terminal event
    /// already published, or never registered) - the caller should read the
    /// store for current state instead.
    pub fn subscribe(&self, analysis_id: &str) -> Option<broadcast::Receiver<StatusEvent>> {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(analysis_id)
            .map(|tx| tx.subscribe())
    }

    /// Whether an analysis still has an open channel
    pub fn is_active(&self, analysis_id: &str) -> bool {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(analysis_id)
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer-side guard ensuring the "fetch final result" action runs at
/// most once, even when a polling timer and a subscription callback observe
/// the terminal state concurrently.
///
/// Both observers call [`FinalFetchGuard::try_claim`] before fetching; the
/// compare-and-set admits exactly one.
#[derive(Debug, Default)]
pub struct FinalFetchGuard {
    claimed: AtomicBool,
}

impl FinalFetchGuard {
    /// Create an unclaimed guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to claim the fetch. Returns `true` for exactly one caller.
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the fetch has been claimed
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, status: AnalysisStatus, is_final: bool) -> StatusEvent {
        StatusEvent {
            id: id.to_string(),
            status,
            current_agent: None,
            progress_percentage: status.progress_percentage().unwrap_or(0),
            completed_steps: 0,
            latest_update: status.to_string(),
            is_final,
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let broadcaster = StatusBroadcaster::new();
        broadcaster.register("a1");

        let mut rx = broadcaster.subscribe("a1").unwrap();
        broadcaster.publish(event("a1", AnalysisStatus::Researching, false));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.status, AnalysisStatus::Researching);
        assert!(!received.is_final);
    }

    #[tokio::test]
    async fn test_final_event_tears_down_channel() {
        let broadcaster = StatusBroadcaster::new();
        broadcaster.register("a1");
        assert!(broadcaster.is_active("a1"));

        broadcaster.publish(event("a1", AnalysisStatus::Completed, true));

        assert!(!broadcaster.is_active("a1"));
        assert!(broadcaster.subscribe("a1").is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let broadcaster = StatusBroadcaster::new();
        broadcaster.register("a1");
        // No subscriber; the send result is discarded
        broadcaster.publish(event("a1", AnalysisStatus::Analyzing, false));
        assert!(broadcaster.is_active("a1"));
    }

    #[tokio::test]
    async fn test_publish_to_unknown_analysis_is_noop() {
        let broadcaster = StatusBroadcaster::new();
        broadcaster.publish(event("ghost", AnalysisStatus::Completed, true));
        assert!(!broadcaster.is_active("ghost"));
    }

    #[test]
    fn test_event_serializes_final_field_name() {
        let ev = event("a1", AnalysisStatus::Completed, true);
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["final"], serde_json::json!(true));
        assert!(json.get("is_final").is_none());
    }

    #[test]
    fn test_guard_admits_exactly_one_claim() {
        let guard = FinalFetchGuard::new();
        assert!(!guard.is_claimed());
        assert!(guard.try_claim());
        assert!(!guard.try_claim());
        assert!(guard.is_claimed());
    }
}
