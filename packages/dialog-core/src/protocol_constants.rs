//! Fixed protocol and tuning constants for the dialog proxy.
//!
//! Values in the "Upstream Protocol" section are dictated by the upstream model's
//! wire format and should not be changed without checking the upstream contract.
//! Values elsewhere are tuning defaults and may be overridden via [`crate::config::Config`].

// ─────────────────────────────────────────────────────────────────────────────
// Upstream Protocol
// ─────────────────────────────────────────────────────────────────────────────

/// Sample rate (Hz) the upstream model expects for inbound client audio.
pub const UPSTREAM_INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate (Hz) the upstream model emits for generated audio.
pub const UPSTREAM_OUTPUT_SAMPLE_RATE: u32 = 24000;

/// MIME type used when wrapping client audio for the upstream `media_chunks` field.
pub const UPSTREAM_AUDIO_MIME: &str = "audio/pcm;rate=16000";

// ─────────────────────────────────────────────────────────────────────────────
// Segmentation Engine (C6)
// ─────────────────────────────────────────────────────────────────────────────

/// Silence amplitude threshold (absolute PCM16 sample value) below which a sample
/// counts toward a silence run.
pub const DEFAULT_SILENCE_THRESHOLD: i16 = 750;

/// Minimum duration (ms) of continuous silence required to cut an audio segment.
pub const DEFAULT_SILENCE_DURATION_MS: u64 = 320;

/// Sample rate (Hz) used to convert `silence_duration_ms` into a sample count.
pub const SEGMENTER_SAMPLE_RATE: u32 = UPSTREAM_OUTPUT_SAMPLE_RATE;

/// Floor (ms) below which a paired segment's audio is extended by merging
/// subsequent queued buffers.
pub const MIN_SEGMENT_DURATION_MS: u64 = 300;

/// Maximum number of silence-delimited audio buffers held pending pairing.
/// Oldest is dropped on overflow.
pub const DEFAULT_MAX_PENDING_SEGMENTS: usize = 8;

/// Idle time (ms) with no transcript growth before a trailing partial sentence
/// is force-committed.
pub const IDLE_PARTIAL_COMMIT_MS: u64 = 1200;

/// Minimum character length for an idle-forced partial commit.
pub const IDLE_PARTIAL_COMMIT_MIN_CHARS: usize = 8;

/// Initial grace window (ms) after a generation-complete signal before the turn
/// is forcibly finalized.
pub const TURN_FINALIZE_GRACE_MS: u64 = 1800;

/// Maximum extension (ms) of the finalize grace window if new segments or
/// transcript growth arrive before it expires.
pub const TURN_FINALIZE_MAX_GRACE_MS: u64 = 2100;

// ─────────────────────────────────────────────────────────────────────────────
// Upstream Session (C8)
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum interval (ms) before a planned (non-error) reconnect is initiated.
pub const PLANNED_RECONNECT_MIN_MS: u64 = 8 * 60 * 1000;

/// Maximum interval (ms) before a planned reconnect is initiated.
pub const PLANNED_RECONNECT_MAX_MS: u64 = 9 * 60 * 1000;

/// Interval (ms) between WebSocket heartbeat pings to the upstream connection.
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Maximum number of client frames queued while the upstream connection is not
/// yet `Open`. Oldest is dropped on overflow.
pub const PENDING_QUEUE_CAPACITY: usize = 256;

/// Initial backoff delay (ms) after a retryable upstream close (C4).
pub const BACKOFF_INITIAL_MS: u64 = 500;

/// Backoff delay multiplier per attempt (C4).
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Backoff delay cap (ms) (C4).
pub const BACKOFF_CAP_MS: u64 = 15_000;

/// Backoff jitter fraction applied symmetrically around the computed delay.
pub const BACKOFF_JITTER_FRACTION: f64 = 0.2;

// ─────────────────────────────────────────────────────────────────────────────
// Adaptive Rate Limiter (C3)
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum penalty level the rate limiter will escalate to.
pub const RATE_LIMITER_MAX_LEVEL: u8 = 5;

/// Base penalty duration (ms) multiplied by the current level, plus a fixed
/// offset, when a rate-limit signal is observed.
pub const RATE_LIMITER_PENALTY_BASE_MS: u64 = 1000;

/// Fixed offset (ms) added to every rate-limit penalty window.
pub const RATE_LIMITER_PENALTY_OFFSET_MS: u64 = 500;

// ─────────────────────────────────────────────────────────────────────────────
// Player Core (C9/C10)
// ─────────────────────────────────────────────────────────────────────────────

/// Default amount of queued audio (ms) required before the player arms for the
/// first time after a reset.
pub const DEFAULT_INITIAL_QUEUE_MS: u64 = 1300;

/// Minimum amount of queued audio (ms) required to re-arm after an underrun.
pub const REARM_QUEUE_FLOOR_MS: u64 = 80;

/// Window (ms) after a supersede during which arming is suppressed.
pub const DEFAULT_ARM_SUPERSEDE_QUIET_MS: u64 = 120;

/// Silence (ms) prepended when the player arms for the first time.
pub const DEFAULT_START_LEAD_MS: u64 = 40;

/// Silence (ms) prepended between sentences when re-arming after prior playback.
pub const DEFAULT_SENTENCE_PAUSE_MS: u64 = 120;

/// Maximum amount of buffered audio (ms) retained before trimming the oldest.
pub const DEFAULT_MAX_BUFFER_MS: u64 = 4000;

/// Grace window (ms) after first playback during which buffer overflow is
/// accepted rather than trimmed.
pub const DEFAULT_TRIM_GRACE_MS: u64 = 250;

/// Window (ms) since last playback within which a supersede is treated as
/// "soft" (buffer kept) rather than a hard reset.
pub const DEFAULT_COMMIT_GUARD_MS: u64 = 300;

/// Duration (ms) of the linear fade-in ramp applied to the first audible sample.
pub const FADE_IN_MS: u64 = 80;

/// Duration (ms) of the raised-cosine fade applied to the head/tail of each
/// accepted chunk before join blending.
pub const EDGE_FADE_MS: u64 = 8;

/// Window (ms) searched from the start of a chunk for a zero crossing to trim
/// leading samples against.
pub const ZERO_CROSSING_SEARCH_MS: u64 = 6;

/// Number of initial chunks after a reset that are appended without crossfade
/// (warmup period).
pub const JOIN_WARMUP_CHUNKS: u32 = 2;

/// Window (ms) used to measure RMS before/after a join boundary.
pub const JOIN_RMS_WINDOW_MS: u64 = 20;

/// RMS delta below which two chunks are joined without crossfading.
pub const JOIN_RMS_DELTA_THRESHOLD: f32 = 0.02;

/// Minimum crossfade length (ms) applied at a join when RMS delta exceeds the
/// threshold.
pub const JOIN_CROSSFADE_MIN_MS: u64 = 12;

/// Maximum crossfade length (ms) applied at a join.
pub const JOIN_CROSSFADE_MAX_MS: u64 = 20;

/// RMS delta at or above which the crossfade length saturates at its maximum.
pub const JOIN_RMS_DELTA_SATURATION: f32 = 0.12;

/// Interval (ms) between periodic `diagnostic` events emitted by the player.
pub const PLAYER_DIAGNOSTIC_INTERVAL_MS: u64 = 250;

// ─────────────────────────────────────────────────────────────────────────────
// Caption Processor (C11)
// ─────────────────────────────────────────────────────────────────────────────

/// Debounce window (ms) before scheduling a new voice for an uncommitted suffix.
pub const CAPTION_DEBOUNCE_MS: u64 = 600;

/// Estimated duration (ms) per character used to size voice completion timers.
pub const CAPTION_MS_PER_CHAR: u64 = 80;

/// Minimum clamp (ms) for an estimated voice completion duration.
pub const CAPTION_MIN_VOICE_DURATION_MS: u64 = 400;

/// Maximum clamp (ms) for an estimated voice completion duration.
pub const CAPTION_MAX_VOICE_DURATION_MS: u64 = 6000;

/// Idle time (ms) with no caption update before a fallback timeout commit fires.
pub const CAPTION_TIMEOUT_COMMIT_MS: u64 = 1300;

/// Idle time (ms) after the last audio burst with no caption before an
/// audio-fallback commit fires.
pub const CAPTION_AUDIO_FALLBACK_MS: u64 = 900;

/// Minimum number of commits observed before metrics thresholds are evaluated
/// for alerting.
pub const CAPTION_METRICS_MIN_SAMPLE: u64 = 200;

// ─────────────────────────────────────────────────────────────────────────────
// API Layer
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the event broadcast channel fanned out to WebSocket clients.
pub const EVENT_CHANNEL_CAPACITY: usize = 128;

/// WebSocket heartbeat timeout (seconds) for the client-facing connection.
pub const WS_HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// Interval (seconds) between client-facing WebSocket heartbeat checks.
pub const WS_HEARTBEAT_CHECK_INTERVAL_SECS: u64 = 10;
