//! Caption debounce, voice scheduling, and fallback commit (C11).
//!
//! Like [`crate::segment::engine::SegmentationEngine`], this is clock-agnostic:
//! callers feed it `Instant`s and drive [`CaptionProcessor::tick`] from their
//! own loop rather than the processor owning a timer.
//!
//! State is kept per caption key (`turn-N#seq`, one key per caption slot
//! within a turn) so that overlapping or superseded captions within the same
//! session don't clobber each other's debounce/fallback timers.

use std::collections::HashMap;
use std::time::Instant;

use crate::config::CaptionConfig;
use crate::protocol_constants::{CAPTION_MAX_VOICE_DURATION_MS, CAPTION_MIN_VOICE_DURATION_MS, CAPTION_MS_PER_CHAR};

use super::guard::CaptionGuard;
use super::metrics::{CaptionMetrics, CommitReason};

/// Minimum trimmed length a selected caption must have to be committed,
/// unless it matches [`SHORT_WHITELIST`].
const CAPTION_MIN_SELECTED_CHARS: usize = 3;

/// Short utterances that are meaningful on their own and should not be
/// dropped by the minimum-length rule.
const SHORT_WHITELIST: &[&str] = &[
    "ok", "okay", "yes", "no", "yeah", "yep", "nope", "sure", "right", "mm-hmm", "hi", "hey", "bye",
];

/// A caption ready to hand to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCommit {
    pub key: String,
    pub text: String,
    pub reason: CommitReason,
}

/// A voice scheduled (but not necessarily delivered) for an uncommitted
/// caption suffix, carrying the text snapshot it covers and an estimate of
/// how long it takes to speak.
struct ScheduledVoice {
    text: String,
    duration_ms: u64,
}

/// Per-caption-key debounce/fallback state.
struct KeyState {
    pending: String,
    scheduled_chars: usize,
    last_update_at: Option<Instant>,
    last_audio_at: Option<Instant>,
    voices: Vec<ScheduledVoice>,
}

impl KeyState {
    fn new() -> Self {
        Self {
            pending: String::new(),
            scheduled_chars: 0,
            last_update_at: None,
            last_audio_at: None,
            voices: Vec::new(),
        }
    }
}

pub struct CaptionProcessor {
    guard: CaptionGuard,
    debounce_ms: u64,
    timeout_commit_ms: u64,
    audio_fallback_ms: u64,
    keys: HashMap<String, KeyState>,
    metrics: CaptionMetrics,
}

impl CaptionProcessor {
    pub fn new(config: &CaptionConfig) -> Self {
        Self {
            guard: CaptionGuard::new(&config.allow_patterns, &config.block_patterns),
            debounce_ms: config.debounce_ms,
            timeout_commit_ms: config.timeout_commit_ms,
            audio_fallback_ms: config.audio_fallback_ms,
            keys: HashMap::new(),
            metrics: CaptionMetrics::default(),
        }
    }

    pub fn metrics(&self) -> &CaptionMetrics {
        &self.metrics
    }

    /// Ingests a new caption fragment for `key`. Rejected text (guard
    /// mismatch) is dropped and does not update any timers.
    pub fn ingest(&mut self, key: &str, text: &str, now: Instant) {
        if !self.guard.accepts(text) {
            self.metrics.record(CommitReason::Rejected);
            return;
        }
        let state = self.keys.entry(key.to_string()).or_insert_with(KeyState::new);
        state.pending = text.to_string();
        state.last_update_at = Some(now);
    }

    /// Records that an audio burst arrived for `key`, used by the
    /// audio-fallback timer.
    pub fn note_audio_activity(&mut self, key: &str, now: Instant) {
        self.keys.entry(key.to_string()).or_insert_with(KeyState::new).last_audio_at = Some(now);
    }

    /// Advances every tracked key's timers, scheduling a voice for a
    /// newly-idle uncommitted suffix and firing at most one commit per key
    /// when its timeout or audio-fallback deadline has passed.
    pub fn tick(&mut self, now: Instant) -> Vec<CaptionCommit> {
        let keys: Vec<String> = self.keys.keys().cloned().collect();
        let mut commits = Vec::new();
        for key in keys {
            if let Some(commit) = self.tick_key(&key, now) {
                commits.push(commit);
            }
        }
        commits
    }

    fn tick_key(&mut self, key: &str, now: Instant) -> Option<CaptionCommit> {
        let reason = {
            let state = self.keys.get_mut(key)?;
            if state.pending.is_empty() {
                return None;
            }
            let updated_at = state.last_update_at?;
            let idle_ms = now.duration_since(updated_at).as_millis() as u64;

            let pending_chars = state.pending.chars().count();
            if idle_ms >= self.debounce_ms && state.scheduled_chars < pending_chars {
                let suffix_chars = pending_chars - state.scheduled_chars;
                state.voices.push(ScheduledVoice {
                    text: state.pending.clone(),
                    duration_ms: estimate_voice_duration_ms(suffix_chars),
                });
                state.scheduled_chars = pending_chars;
            }

            if idle_ms >= self.timeout_commit_ms {
                Some(CommitReason::Timeout)
            } else if let Some(audio_at) = state.last_audio_at {
                let audio_idle_ms = now.duration_since(audio_at).as_millis() as u64;
                (audio_idle_ms >= self.audio_fallback_ms).then_some(CommitReason::AudioFallback)
            } else {
                None
            }
        };
        reason.and_then(|reason| self.commit(key, reason))
    }

    /// Forces an immediate commit for `key` (e.g. on a generation-complete
    /// signal).
    pub fn force_commit(&mut self, key: &str) -> Option<CaptionCommit> {
        if !self.keys.contains_key(key) {
            return None;
        }
        self.commit(key, CommitReason::GenerationComplete)
    }

    /// Selects the best candidate for `key` (by trimmed length, across every
    /// scheduled voice snapshot and the current pending text) and runs it
    /// through sentence selection. Returns `None` (and records a rejection)
    /// if nothing survives selection, consuming the key's state either way.
    fn commit(&mut self, key: &str, reason: CommitReason) -> Option<CaptionCommit> {
        let state = self.keys.remove(key)?;
        match select_final_text(&state) {
            Some(text) => {
                self.metrics.record(reason);
                Some(CaptionCommit { key: key.to_string(), text, reason })
            }
            None => {
                self.metrics.record(CommitReason::Rejected);
                None
            }
        }
    }
}

/// Estimates how long a voice takes to speak `char_count` characters, at a
/// fixed rate per character, clamped to a plausible utterance range.
fn estimate_voice_duration_ms(char_count: usize) -> u64 {
    (char_count as u64 * CAPTION_MS_PER_CHAR).clamp(CAPTION_MIN_VOICE_DURATION_MS, CAPTION_MAX_VOICE_DURATION_MS)
}

/// Picks the longest trimmed candidate among every voice snapshot scheduled
/// for this key plus the current pending text (a later revision can shrink
/// the caption, e.g. on correction, so the longest seen is preferred over
/// whatever happens to be pending when the timer fires), then applies
/// sentence-selection rules: a caption shorter than the minimum is dropped
/// unless it matches the short whitelist.
fn select_final_text(state: &KeyState) -> Option<String> {
    let candidates = state
        .voices
        .iter()
        .map(|v| v.text.as_str())
        .chain(std::iter::once(state.pending.as_str()));

    let mut best: Option<&str> = None;
    for candidate in candidates {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        let better = match best {
            None => true,
            Some(b) => trimmed.chars().count() > b.trim().chars().count(),
        };
        if better {
            best = Some(candidate);
        }
    }

    let best = best?.trim();
    if best.chars().count() >= CAPTION_MIN_SELECTED_CHARS || SHORT_WHITELIST.contains(&best.to_ascii_lowercase().as_str()) {
        Some(best.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> CaptionConfig {
        CaptionConfig {
            debounce_ms: 100,
            timeout_commit_ms: 1000,
            audio_fallback_ms: 300,
            allow_patterns: Vec::new(),
            block_patterns: Vec::new(),
        }
    }

    #[test]
    fn debounce_schedules_a_voice_but_does_not_commit() {
        let mut proc = CaptionProcessor::new(&config());
        let now = Instant::now();
        proc.ingest("turn-0#0", "hello there", now);
        assert!(proc.tick(now + Duration::from_millis(50)).is_empty());
        assert!(proc.tick(now + Duration::from_millis(150)).is_empty());

        let state = proc.keys.get("turn-0#0").unwrap();
        assert_eq!(state.voices.len(), 1, "debounce should have scheduled one voice");
        assert_eq!(state.voices[0].text, "hello there");
    }

    #[test]
    fn timeout_fires_a_real_commit() {
        let mut proc = CaptionProcessor::new(&config());
        let now = Instant::now();
        proc.ingest("turn-0#0", "hello there", now);
        let commits = proc.tick(now + Duration::from_millis(1000));
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].reason, CommitReason::Timeout);
        assert_eq!(commits[0].text, "hello there");
        assert_eq!(commits[0].key, "turn-0#0");
    }

    #[test]
    fn rejected_caption_never_schedules_a_commit() {
        let mut config = config();
        config.block_patterns.push(".*".to_string());
        let mut proc = CaptionProcessor::new(&config);
        let now = Instant::now();
        proc.ingest("turn-0#0", "blocked text", now);
        assert!(proc.tick(now + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn audio_fallback_fires_when_audio_stops_without_caption_update() {
        let mut proc = CaptionProcessor::new(&config());
        let now = Instant::now();
        proc.ingest("turn-0#0", "partial", now);
        proc.note_audio_activity("turn-0#0", now);
        let commits = proc.tick(now + Duration::from_millis(310));
        assert!(!commits.is_empty());
    }

    #[test]
    fn force_commit_emits_generation_complete_reason() {
        let mut proc = CaptionProcessor::new(&config());
        proc.ingest("turn-0#0", "final words", Instant::now());
        let commit = proc.force_commit("turn-0#0").unwrap();
        assert_eq!(commit.reason, CommitReason::GenerationComplete);
        assert_eq!(commit.text, "final words");
    }

    #[test]
    fn force_commit_on_unknown_key_is_none() {
        let mut proc = CaptionProcessor::new(&config());
        assert!(proc.force_commit("turn-0#0").is_none());
    }

    #[test]
    fn keys_are_independent() {
        let mut proc = CaptionProcessor::new(&config());
        let now = Instant::now();
        proc.ingest("turn-0#0", "first caption", now);
        proc.ingest("turn-0#1", "second caption", now + Duration::from_millis(500));

        let commits = proc.tick(now + Duration::from_millis(1000));
        assert_eq!(commits.len(), 1, "only the first key's timeout should have elapsed");
        assert_eq!(commits[0].key, "turn-0#0");

        let commits = proc.tick(now + Duration::from_millis(1600));
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].key, "turn-0#1");
    }

    #[test]
    fn best_candidate_prefers_longest_snapshot_over_a_shrunk_pending() {
        let mut proc = CaptionProcessor::new(&config());
        let now = Instant::now();
        proc.ingest("turn-0#0", "the quick brown fox", now);
        // debounce fires, scheduling a voice for the full text
        proc.tick(now + Duration::from_millis(150));
        // a correction shrinks the pending text afterward
        proc.ingest("turn-0#0", "the fox", now + Duration::from_millis(200));

        let commits = proc.tick(now + Duration::from_millis(1300));
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].text, "the quick brown fox");
    }

    #[test]
    fn short_caption_below_minimum_is_dropped_unless_whitelisted() {
        let mut proc = CaptionProcessor::new(&config());
        let now = Instant::now();
        proc.ingest("turn-0#0", "mm", now);
        let commits = proc.tick(now + Duration::from_millis(1000));
        assert!(commits.is_empty(), "non-whitelisted fragments under the minimum length are dropped");

        proc.ingest("turn-0#1", "ok", now);
        let commits = proc.tick(now + Duration::from_millis(1000));
        assert_eq!(commits.len(), 1, "whitelisted short utterances still commit");
        assert_eq!(commits[0].text, "ok");
    }

    #[test]
    fn voice_duration_estimate_is_clamped() {
        assert_eq!(estimate_voice_duration_ms(1), CAPTION_MIN_VOICE_DURATION_MS);
        assert_eq!(estimate_voice_duration_ms(200), CAPTION_MAX_VOICE_DURATION_MS);
        assert_eq!(estimate_voice_duration_ms(10), 10 * CAPTION_MS_PER_CHAR);
    }
}
