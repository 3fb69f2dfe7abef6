//! Core application configuration.
//!
//! Groups every tunable named by the segmentation engine, upstream session,
//! player core, and caption processor behind one [`Config`] struct with
//! sensible defaults and a `validate()` pass. Nested sub-configs follow the
//! same `Default` + `validate` shape so each component can validate its own
//! corner independently of the others.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::*;

/// Tunables for the segmentation engine (C6).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SegmenterConfig {
    /// PCM sample rate (Hz) the segmenter interprets incoming audio at.
    pub sample_rate: u32,
    /// Absolute PCM16 sample magnitude below which a sample counts as silence.
    pub silence_threshold: i16,
    /// Continuous silence (ms) required to cut a segment.
    pub silence_duration_ms: u64,
    /// Maximum silence-delimited audio buffers held pending pairing.
    pub max_pending_segments: usize,
    /// Duration floor (ms) below which adjacent audio is merged into a segment.
    pub min_segment_duration_ms: u64,
    /// Idle time (ms) with no transcript growth before forcing a partial commit.
    pub idle_partial_commit_ms: u64,
    /// Minimum character count for an idle-forced partial commit.
    pub idle_partial_commit_min_chars: usize,
    /// Initial grace window (ms) before a turn is forcibly finalized.
    pub turn_finalize_grace_ms: u64,
    /// Maximum grace window extension (ms) for a turn finalization.
    pub turn_finalize_max_grace_ms: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sample_rate: SEGMENTER_SAMPLE_RATE,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            silence_duration_ms: DEFAULT_SILENCE_DURATION_MS,
            max_pending_segments: DEFAULT_MAX_PENDING_SEGMENTS,
            min_segment_duration_ms: MIN_SEGMENT_DURATION_MS,
            idle_partial_commit_ms: IDLE_PARTIAL_COMMIT_MS,
            idle_partial_commit_min_chars: IDLE_PARTIAL_COMMIT_MIN_CHARS,
            turn_finalize_grace_ms: TURN_FINALIZE_GRACE_MS,
            turn_finalize_max_grace_ms: TURN_FINALIZE_MAX_GRACE_MS,
        }
    }
}

impl SegmenterConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample_rate must be >= 1".to_string());
        }
        if self.max_pending_segments == 0 {
            return Err("max_pending_segments must be >= 1".to_string());
        }
        if self.turn_finalize_max_grace_ms < self.turn_finalize_grace_ms {
            return Err(
                "turn_finalize_max_grace_ms must be >= turn_finalize_grace_ms".to_string(),
            );
        }
        Ok(())
    }
}

/// Tunables for the upstream session (C8).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// Upstream model identifier sent in the setup payload.
    pub model: String,
    /// Upstream API key (sensitive; never logged).
    #[serde(default)]
    pub api_key: String,
    /// Upstream WebSocket URL.
    pub url: String,
    /// Voice name requested for generated speech.
    pub voice: String,
    /// Optional system instruction sent in the setup payload.
    #[serde(default)]
    pub system_instruction: String,
    /// Minimum interval (ms) before a planned reconnect.
    pub planned_reconnect_min_ms: u64,
    /// Maximum interval (ms) before a planned reconnect.
    pub planned_reconnect_max_ms: u64,
    /// Interval (ms) between heartbeat pings. 0 disables heartbeat.
    pub heartbeat_interval_ms: u64,
    /// Maximum inbound client frames queued while not yet connected.
    pub pending_queue_capacity: usize,
    /// Initial backoff delay (ms) after a retryable close.
    pub backoff_initial_ms: u64,
    /// Backoff delay multiplier per attempt.
    pub backoff_multiplier: f64,
    /// Backoff delay cap (ms).
    pub backoff_cap_ms: u64,
    /// Backoff jitter fraction (symmetric) applied to each delay.
    pub backoff_jitter_fraction: f64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            api_key: String::new(),
            url: String::new(),
            voice: "default".to_string(),
            system_instruction: String::new(),
            planned_reconnect_min_ms: PLANNED_RECONNECT_MIN_MS,
            planned_reconnect_max_ms: PLANNED_RECONNECT_MAX_MS,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            pending_queue_capacity: PENDING_QUEUE_CAPACITY,
            backoff_initial_ms: BACKOFF_INITIAL_MS,
            backoff_multiplier: BACKOFF_MULTIPLIER,
            backoff_cap_ms: BACKOFF_CAP_MS,
            backoff_jitter_fraction: BACKOFF_JITTER_FRACTION,
        }
    }
}

impl UpstreamConfig {
    /// Validates the configuration values.
    ///
    /// Does not require `model`/`url`/`api_key` to be non-empty here; that
    /// check happens at session start, surfaced as
    /// [`crate::error::DialogError::UpstreamNotConfigured`].
    pub fn validate(&self) -> Result<(), String> {
        if self.planned_reconnect_max_ms < self.planned_reconnect_min_ms {
            return Err(
                "planned_reconnect_max_ms must be >= planned_reconnect_min_ms".to_string(),
            );
        }
        if self.backoff_cap_ms < self.backoff_initial_ms {
            return Err("backoff_cap_ms must be >= backoff_initial_ms".to_string());
        }
        if self.pending_queue_capacity == 0 {
            return Err("pending_queue_capacity must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Tunables for the player core (C9/C10).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlayerConfig {
    /// Device output sample rate (Hz).
    pub device_sample_rate: u32,
    /// Queued audio (ms) required before the player first arms.
    pub initial_queue_ms: u64,
    /// Window (ms) after a supersede during which arming is suppressed.
    pub arm_supersede_quiet_ms: u64,
    /// Silence (ms) prepended on first arm.
    pub start_lead_ms: u64,
    /// Silence (ms) prepended between sentences on re-arm.
    pub sentence_pause_ms: u64,
    /// Maximum buffered audio (ms) retained before trimming.
    pub max_buffer_ms: u64,
    /// Grace window (ms) after first playback during which overflow is accepted.
    pub trim_grace_ms: u64,
    /// Window (ms) since last playback within which a supersede is treated as
    /// "soft" (buffer kept, not cleared) rather than a hard reset.
    pub commit_guard_ms: u64,
    /// Whether a prefix-only transcript change is allowed to trigger a
    /// supersede at all.
    pub supersede_prefix_enabled: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            device_sample_rate: UPSTREAM_OUTPUT_SAMPLE_RATE,
            initial_queue_ms: DEFAULT_INITIAL_QUEUE_MS,
            arm_supersede_quiet_ms: DEFAULT_ARM_SUPERSEDE_QUIET_MS,
            start_lead_ms: DEFAULT_START_LEAD_MS,
            sentence_pause_ms: DEFAULT_SENTENCE_PAUSE_MS,
            max_buffer_ms: DEFAULT_MAX_BUFFER_MS,
            trim_grace_ms: DEFAULT_TRIM_GRACE_MS,
            commit_guard_ms: DEFAULT_COMMIT_GUARD_MS,
            supersede_prefix_enabled: true,
        }
    }
}

impl PlayerConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.device_sample_rate == 0 {
            return Err("device_sample_rate must be >= 1".to_string());
        }
        if self.max_buffer_ms == 0 {
            return Err("max_buffer_ms must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Tunables for the caption processor (C11).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptionConfig {
    /// Debounce window (ms) before scheduling a voice for a new suffix.
    pub debounce_ms: u64,
    /// Idle time (ms) before a timeout fallback commit fires.
    pub timeout_commit_ms: u64,
    /// Idle time (ms) after last audio burst before an audio-fallback commit fires.
    pub audio_fallback_ms: u64,
    /// Allow-list regex patterns; a caption matching any is always accepted.
    #[serde(default)]
    pub allow_patterns: Vec<String>,
    /// Block-list regex patterns; a caption matching any (and no allow match) is rejected.
    #[serde(default)]
    pub block_patterns: Vec<String>,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: CAPTION_DEBOUNCE_MS,
            timeout_commit_ms: CAPTION_TIMEOUT_COMMIT_MS,
            audio_fallback_ms: CAPTION_AUDIO_FALLBACK_MS,
            allow_patterns: Vec::new(),
            block_patterns: Vec::new(),
        }
    }
}

impl CaptionConfig {
    /// Validates the configuration values, including that every regex pattern compiles.
    pub fn validate(&self) -> Result<(), String> {
        for pattern in self.allow_patterns.iter().chain(self.block_patterns.iter()) {
            regex::Regex::new(pattern).map_err(|e| format!("invalid regex {pattern:?}: {e}"))?;
        }
        Ok(())
    }
}

/// Top-level configuration for the dialog proxy.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Preferred port for the HTTP/WS server (0 = auto-allocate).
    pub preferred_port: u16,
    /// Segmentation engine tunables.
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    /// Upstream session tunables.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Player core tunables.
    #[serde(default)]
    pub player: PlayerConfig,
    /// Caption processor tunables.
    #[serde(default)]
    pub caption: CaptionConfig,
    /// Capacity of the event broadcast channel.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Client-facing WebSocket heartbeat timeout (seconds).
    #[serde(default = "default_ws_heartbeat_timeout_secs")]
    pub ws_heartbeat_timeout_secs: u64,
}

fn default_event_channel_capacity() -> usize {
    EVENT_CHANNEL_CAPACITY
}

fn default_ws_heartbeat_timeout_secs() -> u64 {
    WS_HEARTBEAT_TIMEOUT_SECS
}

impl Config {
    /// Validates the full configuration, including each nested sub-config.
    pub fn validate(&self) -> Result<(), String> {
        self.segmenter.validate()?;
        self.upstream.validate()?;
        self.player.validate()?;
        self.caption.validate()?;
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)"
                    .to_string(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_default_has_expected_port() {
        let config = Config::default();
        assert_eq!(config.preferred_port, 0);
    }

    #[test]
    fn segmenter_rejects_inverted_grace_window() {
        let mut cfg = SegmenterConfig::default();
        cfg.turn_finalize_max_grace_ms = cfg.turn_finalize_grace_ms - 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn upstream_rejects_inverted_reconnect_window() {
        let mut cfg = UpstreamConfig::default();
        cfg.planned_reconnect_max_ms = cfg.planned_reconnect_min_ms - 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn caption_rejects_invalid_regex() {
        let mut cfg = CaptionConfig::default();
        cfg.block_patterns.push("(".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn caption_accepts_valid_regex() {
        let mut cfg = CaptionConfig::default();
        cfg.allow_patterns.push(r"^\?$".to_string());
        assert!(cfg.validate().is_ok());
    }
}
