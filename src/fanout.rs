//! Best-effort real-time distribution of reconciled state changes.
//!
//! One shared broadcast channel feeds a bounded relay queue per observer. A
//! full relay drops the event for that observer only; producers never wait.

use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Event sent after a job or run record changed.
pub const WORKFLOW_UPDATE: &str = "workflow_update";
/// Event sent after a scheduler flush that touched at least one row.
pub const METRICS_UPDATE: &str = "metrics_update";
/// First event every observer receives.
pub const CONNECTED: &str = "connected";

/// A named event with a JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FanoutEvent {
    pub name: String,
    pub data: Value,
}

/// Handle to the shared channel. Cheap to clone.
#[derive(Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<FanoutEvent>,
    shutdown: CancellationToken,
}

impl Broadcaster {
    /// Creates the shared channel.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Events buffered in the shared channel before slow
    ///   forwarders start lagging
    /// * `shutdown` - Stops every forwarding task when cancelled
    pub fn new(capacity: usize, shutdown: CancellationToken) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, shutdown }
    }

    /// Publishes an event to every attached observer. Never blocks.
    pub fn broadcast(&self, name: &str, data: impl Serialize) {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(e) => {
                warn!("Dropping {name} event that failed to serialize: {e}");
                return;
            }
        };

        // An error only means nobody is listening.
        if self
            .sender
            .send(FanoutEvent {
                name: name.to_string(),
                data,
            })
            .is_err()
        {
            debug!("No observers attached for {name} event");
        }
    }

    /// Attaches an observer with its own relay queue of `capacity` events.
    ///
    /// The observer is subscribed before this returns, so it sees every event
    /// broadcast afterwards (subject to its relay capacity). Dropping the
    /// receiver detaches it.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<FanoutEvent> {
        let source = self.sender.subscribe();
        let (relay, receiver) = mpsc::channel(capacity.max(1));

        tokio::spawn(forward(source, relay, self.shutdown.clone()));

        receiver
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

async fn forward(
    mut source: broadcast::Receiver<FanoutEvent>,
    relay: mpsc::Sender<FanoutEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = relay.closed() => break,
            received = source.recv() => match received {
                Ok(event) => match relay.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(event)) => {
                        debug!("Observer relay full, dropping {} event", event.name);
                    }
                    Err(TrySendError::Closed(_)) => break,
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Observer forwarder lagged, skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    debug!("Observer detached");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use serde_json::json;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn drain(receiver: &mut mpsc::Receiver<FanoutEvent>) -> Vec<FanoutEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_observer_receives_events_in_order() {
        let fanout = Broadcaster::new(16, CancellationToken::new());
        let mut observer = fanout.subscribe(16);

        fanout.broadcast(WORKFLOW_UPDATE, json!({ "id": 1 }));
        fanout.broadcast(WORKFLOW_UPDATE, json!({ "id": 2 }));
        settle().await;

        let events = drain(&mut observer);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data["id"], 1);
        assert_eq!(events[1].data["id"], 2);
    }

    #[tokio::test]
    async fn test_full_relay_drops_without_affecting_others() {
        let fanout = Broadcaster::new(256, CancellationToken::new());
        let mut slow = fanout.subscribe(3);
        let mut fast = fanout.subscribe(100);

        for id in 0..20 {
            fanout.broadcast(WORKFLOW_UPDATE, json!({ "id": id }));
        }
        settle().await;

        let slow_events = drain(&mut slow);
        assert!(slow_events.len() <= 3);
        assert!(!slow_events.is_empty());
        // The oldest events are kept, later ones dropped.
        assert_eq!(slow_events[0].data["id"], 0);

        assert_eq!(drain(&mut fast).len(), 20);
    }

    #[tokio::test]
    async fn test_broadcast_without_observers_is_harmless() {
        let fanout = Broadcaster::new(4, CancellationToken::new());
        fanout.broadcast(METRICS_UPDATE, json!({}));
        assert_eq!(fanout.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_observer_detaches() {
        let fanout = Broadcaster::new(4, CancellationToken::new());
        let observer = fanout.subscribe(4);
        let mut other = fanout.subscribe(4);
        assert_eq!(fanout.observer_count(), 2);

        drop(observer);
        settle().await;
        assert_eq!(fanout.observer_count(), 1);

        fanout.broadcast(WORKFLOW_UPDATE, json!({ "id": 1 }));
        settle().await;
        assert_eq!(drain(&mut other).len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_relays() {
        let shutdown = CancellationToken::new();
        let fanout = Broadcaster::new(4, shutdown.clone());
        let mut observer = fanout.subscribe(4);

        shutdown.cancel();

        let closed = tokio::time::timeout(Duration::from_secs(1), observer.recv()).await;
        assert_eq!(closed.unwrap(), None);
    }
}
