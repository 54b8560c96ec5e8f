//! Run event system for observability.
//!
//! Emits [`RunEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (loggers, CI reporters, UI, etc.) can follow a golden
//! run's progress without coupling to the harness internals.

use serde::{Deserialize, Serialize};

/// Events emitted during a golden run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    RunStarted {
        fixture_count: usize,
    },
    FixtureStarted {
        fixture: String,
        kind: String,
    },
    FixturePassed {
        fixture: String,
        duration_ms: u64,
    },
    FixtureFailed {
        fixture: String,
        reason: String,
    },
    RunCompleted {
        passed: usize,
        failed: usize,
        duration_ms: u64,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(RunEvent::FixtureStarted {
            fixture: "postgres_odbc".into(),
            kind: "connection_builder".into(),
        });

        let event = rx.recv().await.unwrap();
        match event {
            RunEvent::FixtureStarted { fixture, kind } => {
                assert_eq!(fixture, "postgres_odbc");
                assert_eq!(kind, "connection_builder");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let emitter = EventEmitter::new(16);
        let mut rx1 = emitter.subscribe();
        let mut rx2 = emitter.subscribe();

        emitter.emit(RunEvent::RunCompleted {
            passed: 4,
            failed: 1,
            duration_ms: 37,
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();

        // Both subscribers should get the same event content.
        let json1 = serde_json::to_string(&e1).unwrap();
        let json2 = serde_json::to_string(&e2).unwrap();
        assert_eq!(json1, json2);
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(16);
        // No subscriber — this must not panic.
        emitter.emit(RunEvent::FixtureFailed {
            fixture: "mysql_legacy".into(),
            reason: "output mismatch".into(),
        });
    }
}
