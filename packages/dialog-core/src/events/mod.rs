//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain components to emit events without
//!   knowing about transport
//! - Event types for segmentation, player, and upstream session state
//!
//! The actual transport implementation (the client WebSocket) is handled
//! separately in the `api` module using [`BroadcastEventBridge`].

mod emitter;

pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

/// Events broadcast to the connected client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Events from the segmentation engine (segment/turn commits, diagnostics).
    Segment(SegmentEvent),
    /// Events from the player core.
    Player(PlayerEvent),
    /// Events from the upstream session state machine.
    Session(SessionEvent),
}

/// A single paired (sentence, audio) commit from the segmentation engine (C6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentEvent {
    /// A segment (sentence + audio) was committed.
    SegmentCommit {
        #[serde(rename = "segmentId")]
        segment_id: String,
        #[serde(rename = "turnId")]
        turn_id: u64,
        index: u64,
        text: String,
        #[serde(rename = "audioBase64")]
        audio_base64: String,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        #[serde(rename = "nominalDurationMs")]
        nominal_duration_ms: u64,
        #[serde(rename = "audioBytes")]
        audio_bytes: usize,
        #[serde(rename = "audioSamples")]
        audio_samples: usize,
        timestamp: u64,
    },
    /// A turn (contiguous utterance) finalized.
    TurnCommit {
        #[serde(rename = "turnId")]
        turn_id: u64,
        #[serde(rename = "finalText")]
        final_text: String,
        #[serde(rename = "segmentCount")]
        segment_count: u64,
        timestamp: u64,
    },
    /// Diagnostics emitted only under suspicion of a malformed pairing
    /// (zero-audio segment, a suspiciously short best candidate, or a
    /// non-empty transcript paired with zero audio bytes).
    SegmentDiagnostics {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "turnId")]
        turn_id: u64,
        #[serde(rename = "transcriptLength")]
        transcript_length: usize,
        #[serde(rename = "partialLength")]
        partial_length: usize,
        #[serde(rename = "pendingTextCount")]
        pending_text_count: usize,
        #[serde(rename = "pendingTextLength")]
        pending_text_length: usize,
        #[serde(rename = "pendingAudioBytes")]
        pending_audio_bytes: usize,
        #[serde(rename = "audioChunkCount")]
        audio_chunk_count: usize,
        #[serde(rename = "audioChunkBytes")]
        audio_chunk_bytes: usize,
        #[serde(rename = "audioChunkMin", skip_serializing_if = "Option::is_none")]
        audio_chunk_min: Option<usize>,
        #[serde(rename = "audioChunkMax", skip_serializing_if = "Option::is_none")]
        audio_chunk_max: Option<usize>,
        #[serde(rename = "zeroAudioSegments")]
        zero_audio_segments: u64,
        timestamp: u64,
    },
}

/// Events from the pull-driven player core (C9/C10).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerEvent {
    ContextInfo {
        epoch: u64,
        timestamp: u64,
    },
    ChunkMetrics {
        #[serde(rename = "joinedMs")]
        joined_ms: u64,
        #[serde(rename = "crossfadeMs")]
        crossfade_ms: u64,
        timestamp: u64,
    },
    QueueLow {
        #[serde(rename = "queuedMs")]
        queued_ms: u64,
        timestamp: u64,
    },
    Underrun {
        timestamp: u64,
    },
    Diagnostic {
        #[serde(rename = "queuedMs")]
        queued_ms: u64,
        armed: bool,
        #[serde(rename = "totalDropped")]
        total_dropped: u64,
        timestamp: u64,
    },
    JoinMetrics {
        #[serde(rename = "rmsDelta")]
        rms_delta: f32,
        #[serde(rename = "crossfadeMs")]
        crossfade_ms: u64,
        timestamp: u64,
    },
    PauseInserted {
        #[serde(rename = "pauseMs")]
        pause_ms: u64,
        timestamp: u64,
    },
    ArmBlocked {
        #[serde(rename = "quietMsRemaining")]
        quiet_ms_remaining: u64,
        timestamp: u64,
    },
    BufferTrimmed {
        #[serde(rename = "droppedMs")]
        dropped_ms: u64,
        timestamp: u64,
    },
    PlaybackArmed {
        epoch: u64,
        timestamp: u64,
    },
}

/// Events from the upstream session state machine (C8).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    UpstreamClosed {
        code: u16,
        reason: String,
        retryable: bool,
        timestamp: u64,
    },
    Reconnecting {
        attempt: u32,
        #[serde(rename = "delayMs")]
        delay_ms: u64,
        timestamp: u64,
    },
    Connected {
        timestamp: u64,
    },
}

// From implementations for converting inner events to BroadcastEvent.
impl From<SegmentEvent> for BroadcastEvent {
    fn from(event: SegmentEvent) -> Self {
        BroadcastEvent::Segment(event)
    }
}

impl From<PlayerEvent> for BroadcastEvent {
    fn from(event: PlayerEvent) -> Self {
        BroadcastEvent::Player(event)
    }
}

impl From<SessionEvent> for BroadcastEvent {
    fn from(event: SessionEvent) -> Self {
        BroadcastEvent::Session(event)
    }
}
