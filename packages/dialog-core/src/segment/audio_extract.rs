//! Audio chunk extraction and payload sanitization (C7).
//!
//! Upstream payloads carry generated audio as base64-encoded chunks nested
//! under a handful of key shapes (both camelCase and snake_case). This module
//! harvests every chunk it can find and returns a sanitized copy of the
//! payload with the raw base64 data replaced by a size marker, suitable for
//! forwarding to the client alongside the binary audio frames.

use base64::Engine;
use serde_json::{Map, Value as Json};

use crate::value::contains_truthy_flag;

const AUDIO_CONTAINER_KEYS: &[&str] = &[
    "inlineData",
    "inline_data",
    "audio",
    "realtimeOutput",
    "realtime_output",
];

/// A harvested audio chunk with its declared MIME type and decoded bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Result of extracting audio from an upstream payload.
#[derive(Debug, Clone, Default)]
pub struct ExtractResult {
    pub chunks: Vec<AudioChunk>,
    pub sanitized: Json,
    pub go_away: bool,
}

/// Extracts every audio chunk reachable under [`AUDIO_CONTAINER_KEYS`], and
/// returns a sanitized copy of `payload` with raw `data` fields replaced by a
/// `{"bytes": N}` marker. Also detects a `goAway` signal anywhere in the tree.
pub fn extract_audio(payload: &Json) -> ExtractResult {
    let mut chunks = Vec::new();
    let go_away = contains_truthy_flag(payload, "goaway");
    let sanitized = sanitize(payload, &mut chunks);
    ExtractResult {
        chunks,
        sanitized,
        go_away,
    }
}

fn sanitize(value: &Json, chunks: &mut Vec<AudioChunk>) -> Json {
    match value {
        Json::Object(map) => {
            let mut out = Map::new();
            for (key, v) in map {
                if AUDIO_CONTAINER_KEYS.contains(&key.as_str()) {
                    if let Some(chunk) = try_harvest(v) {
                        let mut marker = Map::new();
                        marker.insert("sizeBytes".to_string(), Json::from(chunk.bytes.len()));
                        out.insert(key.clone(), Json::Object(marker));
                        chunks.push(chunk);
                        continue;
                    }
                }
                out.insert(key.clone(), sanitize(v, chunks));
            }
            Json::Object(out)
        }
        Json::Array(items) => Json::Array(items.iter().map(|v| sanitize(v, chunks)).collect()),
        other => other.clone(),
    }
}

fn try_harvest(node: &Json) -> Option<AudioChunk> {
    let data = node.get("data").and_then(Json::as_str)?;
    let mime_type = node
        .get("mimeType")
        .or_else(|| node.get("mime_type"))
        .and_then(Json::as_str)
        .unwrap_or("audio/pcm")
        .to_string();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .ok()?;
    Some(AudioChunk { mime_type, bytes })
}
