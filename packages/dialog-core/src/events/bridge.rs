//! Bridge implementation that maps domain events to broadcast transport.
//!
//! The [`BroadcastEventBridge`] lives at the boundary between domain
//! components (segmenter, player, session) and transport concerns, mapping
//! typed domain events to the client-facing WebSocket broadcast channel.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{BroadcastEvent, PlayerEvent, SegmentEvent, SessionEvent};

/// Bridges domain events to the client WebSocket broadcast channel.
///
/// This adapter implements [`EventEmitter`] by forwarding events to a
/// `tokio::sync::broadcast` channel that the WebSocket handler subscribes to.
///
/// An optional external emitter can additionally be set for out-of-band
/// delivery (e.g. a metrics sink), mirroring the bridge/external-emitter
/// split used for WebSocket-plus-frontend delivery elsewhere in this codebase.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Creates a new bridge wrapping an existing broadcast sender.
    pub fn with_sender(tx: broadcast::Sender<BroadcastEvent>) -> Self {
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter for out-of-band event delivery.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    ///
    /// The WebSocket handler uses this to subscribe to events for the
    /// connected client.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    /// Returns a reference to the broadcast sender.
    pub fn sender(&self) -> &broadcast::Sender<BroadcastEvent> {
        &self.tx
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(BroadcastEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_segment, SegmentEvent, Segment);
    impl_emit!(emit_player, PlayerEvent, Player);
    impl_emit!(emit_session, SessionEvent, Session);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_receives_emitted_events() {
        let bridge = BroadcastEventBridge::new(16);
        let mut rx = bridge.subscribe();

        bridge.emit_session(SessionEvent::Connected { timestamp: 42 });

        let received = rx.try_recv().expect("event should be available");
        match received {
            BroadcastEvent::Session(SessionEvent::Connected { timestamp }) => {
                assert_eq!(timestamp, 42);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let bridge = BroadcastEventBridge::new(16);
        bridge.emit_player(PlayerEvent::Underrun { timestamp: 0 });
    }
}
