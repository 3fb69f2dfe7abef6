//! Pull-driven player core (C9): epoch-scoped arming, join-aware chunk
//! ingestion, underrun/trim handling.
//!
//! The player is "pull-driven": an external clock (the audio sink) calls
//! [`PlayerCore::pull`] at its own cadence: the core never drives time on its
//! own, matching how [`crate::segment::engine::SegmentationEngine`] is also
//! clock-agnostic.

use std::sync::Arc;
use std::time::Instant;

use crate::config::PlayerConfig;
use crate::events::{EventEmitter, PlayerEvent};
use crate::protocol_constants::{
    EDGE_FADE_MS, FADE_IN_MS, JOIN_WARMUP_CHUNKS, UPSTREAM_OUTPUT_SAMPLE_RATE, ZERO_CROSSING_SEARCH_MS,
};

use super::join_scheduler::decide_crossfade_ms_for_chunks;
use super::ring_buffer::AudioRingBuffer;
use super::windows::{apply_fade_in, crossfade, find_zero_crossing, raised_cosine_ramp_up, resample_linear, rms};

fn ms_to_samples(ms: u64, sample_rate: u32) -> usize {
    ((ms * sample_rate as u64) / 1000) as usize
}

fn bytes_to_i16le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

pub struct PlayerCore {
    config: PlayerConfig,
    buffer: AudioRingBuffer,
    armed: bool,
    epoch: u64,
    chunks_since_reset: u32,
    prev_tail: Vec<i16>,
    first_playback_at: Option<Instant>,
    last_context_change_at: Option<Instant>,
    total_dropped_samples: u64,
    trim_grace_accepts: u64,
    emitter: Arc<dyn EventEmitter>,
}

impl PlayerCore {
    pub fn new(config: PlayerConfig, emitter: Arc<dyn EventEmitter>) -> Self {
        let capacity = ms_to_samples(config.max_buffer_ms, config.device_sample_rate);
        Self {
            buffer: AudioRingBuffer::new(capacity),
            config,
            armed: false,
            epoch: 0,
            chunks_since_reset: 0,
            prev_tail: Vec::new(),
            first_playback_at: None,
            last_context_change_at: None,
            total_dropped_samples: 0,
            trim_grace_accepts: 0,
            emitter,
        }
    }

    pub fn armed(&self) -> bool {
        self.armed
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn buffered_ms(&self) -> u64 {
        (self.buffer.len() as u64 * 1000) / self.config.device_sample_rate as u64
    }

    /// Starts a new playback epoch (e.g. a new turn superseding a prior
    /// in-flight one).
    ///
    /// `is_prefix_change` marks a supersede triggered by a transcript
    /// revision that only extended/shortened a shared prefix rather than a
    /// genuinely new turn; when [`PlayerConfig::supersede_prefix_enabled`] is
    /// false, such a supersede is ignored entirely. Otherwise, if playback
    /// started within [`PlayerConfig::commit_guard_ms`] of `now`, the
    /// supersede is "soft": the epoch still advances (so late chunks from the
    /// old epoch are recognizable) but the buffer is kept rather than
    /// cleared, avoiding an audible cut on a very recent commit. Further from
    /// a recent commit, the supersede is a hard reset.
    pub fn supersede(&mut self, now: Instant, is_prefix_change: bool) {
        if is_prefix_change && !self.config.supersede_prefix_enabled {
            return;
        }

        let soft = self
            .first_playback_at
            .map(|t| now.duration_since(t).as_millis() as u64 <= self.config.commit_guard_ms)
            .unwrap_or(false);

        if soft {
            self.chunks_since_reset = 0;
            self.prev_tail.clear();
        } else {
            self.hard_reset();
        }
        self.epoch += 1;
        self.last_context_change_at = Some(now);
        self.emitter.emit_player(PlayerEvent::ContextInfo {
            epoch: self.epoch,
            timestamp: crate::utils::now_millis(),
        });
    }

    /// Full reset (`flush`): drops buffered samples, disarms, and clears join
    /// state, but does not advance the epoch — unlike [`supersede`](Self::supersede)
    /// this is not itself a context change.
    pub fn flush(&mut self) {
        self.hard_reset();
    }

    /// Drops queued samples without touching arming state or counters.
    pub fn soft_flush(&mut self) {
        self.buffer.clear();
    }

    fn hard_reset(&mut self) {
        self.buffer.clear();
        self.armed = false;
        self.first_playback_at = None;
        self.chunks_since_reset = 0;
        self.prev_tail.clear();
    }

    /// Ingests one decoded PCM16LE chunk tagged with the epoch active when it
    /// was produced, applying the epoch acceptance policy, resampling from
    /// the upstream's fixed output rate to the device rate, join
    /// crossfades/fade-in, buffering it, and attempting to arm.
    ///
    /// Acceptance: a chunk behind the current epoch by more than one is
    /// dropped (counted in `total_dropped_samples`); behind by exactly one is
    /// accepted once as a trim-grace exception if nothing has played yet in
    /// the current epoch; a chunk ahead of the current epoch is an implicit
    /// supersede — the epoch jumps to match and playback state resets hard.
    pub fn push_chunk(&mut self, pcm16le: &[u8], epoch: u64, now: Instant) {
        if epoch > self.epoch {
            self.hard_reset();
            self.epoch = epoch;
            self.last_context_change_at = Some(now);
            self.emitter.emit_player(PlayerEvent::ContextInfo {
                epoch: self.epoch,
                timestamp: crate::utils::now_millis(),
            });
        } else if epoch < self.epoch {
            let behind = self.epoch - epoch;
            let trim_grace = behind == 1 && self.first_playback_at.is_none();
            if !trim_grace {
                self.total_dropped_samples += (pcm16le.len() / 2) as u64;
                return;
            }
            self.trim_grace_accepts += 1;
        }

        let mut samples = bytes_to_i16le(pcm16le);
        if samples.is_empty() {
            return;
        }
        if self.config.device_sample_rate != UPSTREAM_OUTPUT_SAMPLE_RATE {
            samples = resample_linear(&samples, UPSTREAM_OUTPUT_SAMPLE_RATE, self.config.device_sample_rate);
        }

        if self.chunks_since_reset == 0 {
            let lead = find_zero_crossing(
                &samples,
                ms_to_samples(ZERO_CROSSING_SEARCH_MS, self.config.device_sample_rate),
            );
            if lead > 0 && lead < samples.len() {
                samples.drain(..lead);
            }
            let fade_len = ms_to_samples(FADE_IN_MS, self.config.device_sample_rate).min(samples.len());
            let curve = raised_cosine_ramp_up(fade_len);
            apply_fade_in(&mut samples, &curve);
        } else if self.chunks_since_reset >= JOIN_WARMUP_CHUNKS {
            let window = ms_to_samples(20, self.config.device_sample_rate);
            let prev_window = self.prev_tail.iter().rev().take(window).rev().copied().collect::<Vec<_>>();
            let next_window: Vec<i16> = samples.iter().take(window).copied().collect();
            let crossfade_ms = decide_crossfade_ms_for_chunks(&prev_window, &next_window);
            if crossfade_ms > 0 {
                let curve_len = ms_to_samples(crossfade_ms, self.config.device_sample_rate);
                let blended = crossfade(&self.prev_tail, &samples, curve_len);
                let take = blended.len().min(samples.len());
                samples.splice(0..take, blended[..take].iter().copied());
            }
            self.emitter.emit_player(PlayerEvent::JoinMetrics {
                rms_delta: (rms(&prev_window) - rms(&next_window)).abs(),
                crossfade_ms,
                timestamp: crate::utils::now_millis(),
            });
        }

        let edge_len = ms_to_samples(EDGE_FADE_MS, self.config.device_sample_rate).min(samples.len());
        self.prev_tail = samples[samples.len().saturating_sub(edge_len)..].to_vec();

        let dropped = self.buffer.push(&samples);
        if dropped > 0 {
            let within_grace = self
                .first_playback_at
                .map(|t| now.duration_since(t).as_millis() as u64 <= self.config.trim_grace_ms)
                .unwrap_or(false);
            if !within_grace {
                self.total_dropped_samples += dropped as u64;
                let dropped_ms = (dropped as u64 * 1000) / self.config.device_sample_rate as u64;
                self.emitter.emit_player(PlayerEvent::BufferTrimmed {
                    dropped_ms,
                    timestamp: crate::utils::now_millis(),
                });
            }
        }

        self.chunks_since_reset += 1;
        self.try_arm(now);
    }

    fn try_arm(&mut self, now: Instant) {
        if self.armed {
            return;
        }
        let quiet_elapsed = self
            .last_context_change_at
            .map(|t| now.duration_since(t).as_millis() as u64)
            .unwrap_or(u64::MAX);
        if quiet_elapsed < self.config.arm_supersede_quiet_ms {
            self.emitter.emit_player(PlayerEvent::ArmBlocked {
                quiet_ms_remaining: self.config.arm_supersede_quiet_ms - quiet_elapsed,
                timestamp: crate::utils::now_millis(),
            });
            return;
        }

        let threshold_ms = if self.first_playback_at.is_some() {
            crate::protocol_constants::REARM_QUEUE_FLOOR_MS
        } else {
            self.config.initial_queue_ms
        };
        if self.buffered_ms() >= threshold_ms {
            self.armed = true;
            if self.first_playback_at.is_none() {
                self.first_playback_at = Some(now);
            }
            self.emitter.emit_player(PlayerEvent::PlaybackArmed {
                epoch: self.epoch,
                timestamp: crate::utils::now_millis(),
            });
        }
    }

    /// Pulls up to `n` samples for the audio sink. Emits `Underrun` and
    /// disarms if the buffer cannot satisfy the request.
    pub fn pull(&mut self, n: usize) -> Vec<i16> {
        if !self.armed {
            return Vec::new();
        }
        let out = self.buffer.pop(n);
        if out.len() < n {
            self.armed = false;
            self.emitter.emit_player(PlayerEvent::Underrun {
                timestamp: crate::utils::now_millis(),
            });
        }
        if self.buffered_ms() < 400 && self.armed {
            self.emitter.emit_player(PlayerEvent::QueueLow {
                queued_ms: self.buffered_ms(),
                timestamp: crate::utils::now_millis(),
            });
        }
        out
    }

    /// Emits a periodic diagnostic snapshot; callers should invoke this on
    /// their own timer (see [`crate::protocol_constants::PLAYER_DIAGNOSTIC_INTERVAL_MS`]).
    pub fn emit_diagnostic(&self) {
        self.emitter.emit_player(PlayerEvent::Diagnostic {
            queued_ms: self.buffered_ms(),
            armed: self.armed,
            total_dropped: self.total_dropped_samples,
            timestamp: crate::utils::now_millis(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::emitter::NoopEventEmitter;
    use std::time::Duration;

    // Device rate matches the upstream's fixed output rate so push_chunk's
    // resample step is a no-op and sample counts can be read directly as ms
    // (24 samples/ms at device_sample_rate = UPSTREAM_OUTPUT_SAMPLE_RATE).
    fn core() -> PlayerCore {
        let mut config = PlayerConfig::default();
        config.device_sample_rate = UPSTREAM_OUTPUT_SAMPLE_RATE;
        config.initial_queue_ms = 50;
        config.max_buffer_ms = 500;
        config.arm_supersede_quiet_ms = 0;
        PlayerCore::new(config, Arc::new(NoopEventEmitter))
    }

    fn ms_samples(ms: u64) -> usize {
        ms_to_samples(ms, UPSTREAM_OUTPUT_SAMPLE_RATE)
    }

    fn silence_pcm(samples: usize) -> Vec<u8> {
        vec![0u8; samples * 2]
    }

    #[test]
    fn arms_after_initial_queue_threshold() {
        let mut player = core();
        let now = Instant::now();
        player.push_chunk(&silence_pcm(ms_samples(60)), 0, now);
        assert!(player.armed());
    }

    #[test]
    fn does_not_arm_below_threshold() {
        let mut player = core();
        let now = Instant::now();
        player.push_chunk(&silence_pcm(ms_samples(10)), 0, now);
        assert!(!player.armed());
    }

    #[test]
    fn pull_underruns_and_disarms() {
        let mut player = core();
        let now = Instant::now();
        player.push_chunk(&silence_pcm(ms_samples(60)), 0, now);
        assert!(player.armed());
        let out = player.pull(ms_samples(1000));
        assert!(out.len() < ms_samples(1000));
        assert!(!player.armed());
    }

    #[test]
    fn supersede_resets_epoch_and_clears_buffer() {
        let mut player = core();
        let now = Instant::now();
        player.push_chunk(&silence_pcm(ms_samples(60)), 0, now);
        let epoch_before = player.epoch();
        player.supersede(now + Duration::from_secs(5), false);
        assert_eq!(player.epoch(), epoch_before + 1);
        assert_eq!(player.buffered_ms(), 0);
        assert!(!player.armed());
    }

    #[test]
    fn soft_supersede_keeps_buffer_within_commit_guard() {
        let mut player = core();
        let now = Instant::now();
        player.push_chunk(&silence_pcm(ms_samples(60)), 0, now);
        assert!(player.armed());
        let buffered_before = player.buffered_ms();
        player.supersede(now + Duration::from_millis(50), false);
        assert!(player.buffered_ms() > 0, "soft supersede must not clear the buffer");
        assert_eq!(player.buffered_ms(), buffered_before);
    }

    #[test]
    fn prefix_supersede_ignored_when_disabled() {
        let mut config = PlayerConfig::default();
        config.device_sample_rate = UPSTREAM_OUTPUT_SAMPLE_RATE;
        config.initial_queue_ms = 50;
        config.max_buffer_ms = 500;
        config.arm_supersede_quiet_ms = 0;
        config.supersede_prefix_enabled = false;
        let mut player = PlayerCore::new(config, Arc::new(NoopEventEmitter));
        let now = Instant::now();
        player.push_chunk(&silence_pcm(ms_samples(60)), 0, now);
        let epoch_before = player.epoch();
        player.supersede(now, true);
        assert_eq!(player.epoch(), epoch_before);
    }

    #[test]
    fn pull_while_unarmed_returns_empty() {
        let mut player = core();
        assert_eq!(player.pull(10), Vec::<i16>::new());
    }

    #[test]
    fn push_behind_by_more_than_one_epoch_is_dropped() {
        let mut player = core();
        let now = Instant::now();
        player.push_chunk(&silence_pcm(ms_samples(60)), 0, now);
        player.supersede(now, false); // epoch 1
        player.supersede(now, false); // epoch 2
        let buffered_before = player.buffered_ms();
        player.push_chunk(&silence_pcm(ms_samples(20)), 0, now); // behind by 2
        assert_eq!(player.buffered_ms(), buffered_before, "stale-by-2 push must be dropped");
    }

    #[test]
    fn push_behind_by_one_epoch_is_accepted_once_before_playback() {
        let mut player = core();
        let now = Instant::now();
        player.supersede(now, false); // epoch 1, nothing has played yet
        player.push_chunk(&silence_pcm(ms_samples(20)), 0, now); // behind by 1, !hasPlayed
        assert!(player.buffered_ms() > 0, "trim-grace push must be accepted");
    }

    #[test]
    fn push_behind_by_one_epoch_is_dropped_after_playback() {
        let mut player = core();
        let now = Instant::now();
        player.push_chunk(&silence_pcm(ms_samples(60)), 0, now); // epoch 0 plays
        assert!(player.armed());
        player.supersede(now, false); // epoch 1, hard reset (not within commit guard)
        let buffered_before = player.buffered_ms();
        player.push_chunk(&silence_pcm(ms_samples(20)), 0, now); // behind by 1, but hasPlayed
        assert_eq!(player.buffered_ms(), buffered_before, "stale push after playback must be dropped");
    }

    #[test]
    fn push_ahead_of_epoch_implicitly_supersedes() {
        let mut player = core();
        let now = Instant::now();
        player.push_chunk(&silence_pcm(ms_samples(60)), 0, now);
        assert!(player.armed());
        player.push_chunk(&silence_pcm(ms_samples(20)), 5, now);
        assert_eq!(player.epoch(), 5);
        assert!(!player.armed(), "implicit supersede from an ahead push must hard-reset arming");
    }

    #[test]
    fn flush_clears_buffer_without_advancing_epoch() {
        let mut player = core();
        let now = Instant::now();
        player.push_chunk(&silence_pcm(ms_samples(60)), 0, now);
        let epoch_before = player.epoch();
        player.flush();
        assert_eq!(player.buffered_ms(), 0);
        assert!(!player.armed());
        assert_eq!(player.epoch(), epoch_before);
    }

    #[test]
    fn soft_flush_drops_buffer_but_keeps_armed() {
        let mut player = core();
        let now = Instant::now();
        player.push_chunk(&silence_pcm(ms_samples(60)), 0, now);
        assert!(player.armed());
        player.soft_flush();
        assert_eq!(player.buffered_ms(), 0);
        assert!(player.armed(), "soft_flush must not touch arming state");
    }

    #[test]
    fn push_resamples_from_upstream_rate_to_device_rate() {
        let mut config = PlayerConfig::default();
        config.device_sample_rate = UPSTREAM_OUTPUT_SAMPLE_RATE / 2;
        config.initial_queue_ms = 10_000; // keep this push below the arm threshold
        config.max_buffer_ms = 10_000;
        config.arm_supersede_quiet_ms = 0;
        let mut player = PlayerCore::new(config, Arc::new(NoopEventEmitter));
        let now = Instant::now();

        player.push_chunk(&silence_pcm(2000), 0, now);
        // 2000 samples at the upstream rate resampled to half the rate should
        // buffer roughly half as many device-rate samples.
        let buffered_samples = player.buffer.len();
        assert!(buffered_samples > 900 && buffered_samples < 1100, "got {buffered_samples}");
    }
}
