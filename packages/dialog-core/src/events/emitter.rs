//! Event emitter abstraction for decoupling components from transport.
//!
//! Components depend on the [`EventEmitter`] trait rather than a concrete
//! broadcast channel, enabling testing and alternative transport
//! implementations.

use super::{PlayerEvent, SegmentEvent, SessionEvent};

/// Trait for emitting domain events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a segmentation engine event (segment/turn commit, diagnostics).
    fn emit_segment(&self, event: SegmentEvent);

    /// Emits a player core event.
    fn emit_player(&self, event: PlayerEvent);

    /// Emits an upstream session event.
    fn emit_session(&self, event: SessionEvent);
}

/// No-op emitter for testing.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_segment(&self, _event: SegmentEvent) {}
    fn emit_player(&self, _event: PlayerEvent) {}
    fn emit_session(&self, _event: SessionEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_segment(&self, event: SegmentEvent) {
        log::debug!("[Events] segment_event: {:?}", event);
    }

    fn emit_player(&self, event: PlayerEvent) {
        log::debug!("[Events] player_event: {:?}", event);
    }

    fn emit_session(&self, event: SessionEvent) {
        log::debug!("[Events] session_event: {:?}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test emitter that counts events.
    struct CountingEventEmitter {
        segment_count: AtomicUsize,
        session_count: AtomicUsize,
    }

    impl CountingEventEmitter {
        fn new() -> Self {
            Self {
                segment_count: AtomicUsize::new(0),
                session_count: AtomicUsize::new(0),
            }
        }
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit_segment(&self, _event: SegmentEvent) {
            self.segment_count.fetch_add(1, Ordering::SeqCst);
        }
        fn emit_player(&self, _event: PlayerEvent) {}
        fn emit_session(&self, _event: SessionEvent) {
            self.session_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = Arc::new(CountingEventEmitter::new());

        emitter.emit_segment(SegmentEvent::TurnCommit {
            turn_id: 1,
            final_text: "hello".to_string(),
            segment_count: 1,
            timestamp: 0,
        });
        emitter.emit_session(SessionEvent::Connected { timestamp: 0 });

        assert_eq!(emitter.segment_count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.session_count.load(Ordering::SeqCst), 1);
    }
}
