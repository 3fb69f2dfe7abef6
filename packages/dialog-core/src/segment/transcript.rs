//! Transcript extraction and sentence splitting (C5).
//!
//! Upstream payloads carry a transcript either directly at a well-known path
//! or buried somewhere in a free-form structure. This module tries the direct
//! path first and falls back to a scored tree walk, then splits whatever text
//! it finds into complete sentences plus a trailing partial.

use serde_json::Value as Json;

use crate::value::walk;

const TERMINALS: &[char] = &['。', '．', '.', '？', '?', '！', '!', '…'];

const TEXT_VALUE_KEYS: &[&str] = &["text", "transcript", "outputTranscript", "content"];
const TEXT_CONTAINER_KEYS: &[&str] = &[
    "serverContent",
    "outputTranscription",
    "candidates",
    "parts",
    "delta",
    "response",
];

/// A scored text candidate found while walking a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub score: i64,
}

fn score(text: &str) -> i64 {
    let mut s = text.chars().count() as i64;
    if text.trim_end().ends_with(TERMINALS) {
        s += 10;
    }
    if text.chars().any(char::is_whitespace) {
        s += 2;
    }
    if text.chars().any(|c| ('\u{4E00}'..='\u{9FFF}').contains(&c)) {
        s += 1;
    }
    s
}

/// Extracts the best transcript candidate from an upstream payload.
///
/// Tries the direct `serverContent.outputTranscription.text` path first;
/// falls back to a depth-bounded scored walk over string values reachable
/// from [`TEXT_VALUE_KEYS`].
pub fn extract_transcript(payload: &Json) -> Option<String> {
    if let Some(direct) = payload
        .get("serverContent")
        .and_then(|v| v.get("outputTranscription"))
        .and_then(|v| v.get("text"))
        .and_then(Json::as_str)
    {
        return Some(direct.to_string());
    }
    inspect_candidates(payload)
        .into_iter()
        .max_by(|a, b| a.score.cmp(&b.score).then(b.text.len().cmp(&a.text.len())))
        .map(|c| c.text)
}

/// Returns every distinct candidate string found while walking the payload,
/// scored the same way [`extract_transcript`] selects its winner. Useful for
/// diagnostics when extraction picks an unexpected candidate.
pub fn inspect_candidates(payload: &Json) -> Vec<Candidate> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    walk(payload, |node| {
        if let (Some(key), Json::String(s)) = (node.key, node.value) {
            if TEXT_VALUE_KEYS.contains(&key) || TEXT_CONTAINER_KEYS.contains(&key) {
                let trimmed = s.trim();
                if !trimmed.is_empty() && seen.insert(trimmed.to_string()) {
                    out.push(Candidate {
                        text: trimmed.to_string(),
                        score: score(trimmed),
                    });
                }
            }
        }
        true
    });
    out
}

/// Result of splitting a growing transcript into complete sentences and a
/// trailing partial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitTranscript {
    pub complete: Vec<String>,
    pub partial: String,
}

/// Splits `text` into complete sentences (each ending at a terminal
/// character, trimmed, non-empty) plus whatever trails the last terminal.
pub fn split_sentences(text: &str) -> SplitTranscript {
    let mut complete = Vec::new();
    let mut buf = String::new();
    for ch in text.chars() {
        buf.push(ch);
        if TERMINALS.contains(&ch) {
            let trimmed = buf.trim().to_string();
            if !trimmed.is_empty() {
                complete.push(trimmed);
            }
            buf.clear();
        }
    }
    SplitTranscript {
        complete,
        partial: buf.trim().to_string(),
    }
}

/// Returns `true` if the payload signals that generation has completed, per
/// the `generationComplete`/`turnComplete` flags or a matching `event` name.
pub fn is_generation_complete(payload: &Json) -> bool {
    let flagged = |v: &Json| {
        v.get("generationComplete").and_then(Json::as_bool) == Some(true)
            || v.get("turnComplete").and_then(Json::as_bool) == Some(true)
    };
    if flagged(payload) {
        return true;
    }
    if let Some(server_content) = payload.get("serverContent") {
        if flagged(server_content) {
            return true;
        }
    }
    if let Some(event) = payload.get("event").and_then(Json::as_str) {
        let lower = event.to_ascii_lowercase();
        if matches!(lower.as_str(), "finish" | "completed" | "turncomplete") {
            return true;
        }
    }
    false
}
