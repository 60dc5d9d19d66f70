//! Orchestrator events for external consumers (transport, UI, logging).

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use pl_optimizer::TrialId;
use pl_types::{SessionId, SetupId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    SessionStarted {
        session_id: SessionId,
        vehicle_id: String,
        track_id: String,
        /// True when the session was restored from the store.
        resumed: bool,
    },
    SetupProposed {
        session_id: SessionId,
        setup_id: SetupId,
        trial: TrialId,
    },
    ObservationScored {
        setup_id: SetupId,
        score: f64,
        /// False when no trial was linked to the setup and the tell was skipped.
        correlated: bool,
    },
    BestImproved {
        session_id: SessionId,
        setup_id: SetupId,
        score: f64,
    },
    SessionStopped {
        session_id: SessionId,
        /// Asked trials that never got a reward.
        abandoned: usize,
    },
}

/// Fan-out of events to every live subscriber.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<OrchestratorEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<OrchestratorEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver to every subscriber, dropping those whose receiver is gone.
    pub fn publish(&self, event: OrchestratorEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_out_to_all_subscribers() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(OrchestratorEvent::SessionStopped {
            session_id: 1,
            abandoned: 0,
        });
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(OrchestratorEvent::ObservationScored {
            setup_id: 4,
            score: 0.5,
            correlated: true,
        });
        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(OrchestratorEvent::SessionStopped {
            session_id: 1,
            abandoned: 2,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn tagged_json() {
        let event = OrchestratorEvent::SetupProposed {
            session_id: 1,
            setup_id: 2,
            trial: TrialId(0),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "setup_proposed");
        assert_eq!(json["trial"], 0);
    }
}
