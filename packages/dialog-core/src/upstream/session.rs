//! Upstream session state machine (C8).
//!
//! Owns the outbound WebSocket connection to the generative model, the setup
//! handshake (including session-resumption), heartbeats, planned/reactive
//! reconnects, and the adaptive-rate-limited send path. Message framing and
//! segmentation live in [`crate::segment`]; this module only owns the wire
//! connection and its lifecycle.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use base64::Engine;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{json, Value as Json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::UpstreamConfig;
use crate::error::{DialogError, DialogResult};
use crate::events::{EventEmitter, SessionEvent};
use crate::protocol_constants::UPSTREAM_AUDIO_MIME;

use super::backoff::ExponentialBackoff;
use super::rate_limiter::AdaptiveRateLimiter;

pub type UpstreamStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle state of the upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Draining,
    Closed,
}

/// A normalized upstream close, decoupled from the raw WebSocket close code.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamClosePayload {
    pub code: u16,
    pub reason: String,
    pub retryable: bool,
}

/// Classifies a raw WebSocket close code/reason into a retryable verdict.
///
/// Retryable: abnormal closure (1006), server error (1011), service restart
/// (1012), try-again-later (1013), or a reason containing "429" or starting
/// with "5" (an HTTP-style server error reason). Everything else, including
/// policy violation (1008) and the 4001-4099 application range, is terminal.
pub fn classify_close(code: u16, reason: &str) -> UpstreamClosePayload {
    let lower_reason = reason.to_ascii_lowercase();
    let retryable = matches!(code, 1006 | 1011 | 1012 | 1013)
        || lower_reason.contains("429")
        || lower_reason.starts_with('5');
    UpstreamClosePayload {
        code,
        reason: reason.to_string(),
        retryable,
    }
}

/// Builds the upstream setup/handshake payload, including a resumption
/// handle when continuing a prior session.
pub fn build_setup_payload(config: &UpstreamConfig, resumption_handle: Option<&str>) -> Json {
    let mut setup = json!({
        "model": config.model,
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": config.voice }
                }
            }
        },
        "outputAudioTranscription": {},
    });

    if !config.system_instruction.is_empty() {
        setup["systemInstruction"] = json!({
            "parts": [{ "text": config.system_instruction }]
        });
    }

    if let Some(handle) = resumption_handle {
        setup["sessionResumption"] = json!({ "handle": handle });
    } else {
        setup["sessionResumption"] = json!({});
    }

    json!({ "setup": setup })
}

/// Builds the outbound client-audio frame wrapping base64 PCM, in the
/// snake_case `realtime_input.media_chunks` shape the upstream expects for
/// this message type (the `setup` handshake uses camelCase instead).
pub fn build_audio_chunk_payload(audio_base64: &str) -> Json {
    json!({
        "realtime_input": {
            "media_chunks": [{
                "mime_type": UPSTREAM_AUDIO_MIME,
                "data": audio_base64,
            }]
        }
    })
}

/// Converts an arbitrary client message into the upstream `realtime_input`
/// wire shape: an audio-envelope object (`data` string + audio MIME) becomes
/// `media_chunks`; a JSON object already carrying `realtimeInput` or
/// `realtime_input` is normalized to the snake_case key and forwarded as-is;
/// any other JSON object is forwarded unchanged; anything that doesn't parse
/// as JSON is wrapped as `realtime_input.text`.
pub fn normalize_client_text(text: &str) -> Json {
    match serde_json::from_str::<Json>(text) {
        Ok(Json::Object(mut obj)) => {
            let data = obj.get("data").and_then(Json::as_str).map(str::to_string);
            let mime = obj
                .get("mimeType")
                .or_else(|| obj.get("mime_type"))
                .and_then(Json::as_str)
                .map(str::to_string);
            if let (Some(data), Some(mime)) = (&data, &mime) {
                if mime.starts_with("audio/") {
                    return json!({
                        "realtime_input": {
                            "media_chunks": [{ "mime_type": mime, "data": data }]
                        }
                    });
                }
            }

            if let Some(camel) = obj.remove("realtimeInput") {
                obj.insert("realtime_input".to_string(), camel);
            }
            Json::Object(obj)
        }
        Ok(other) => json!({ "realtime_input": { "text": other.to_string() } }),
        Err(_) => json!({ "realtime_input": { "text": text } }),
    }
}

/// Owns the connection lifecycle and outbound send gating for a single
/// upstream session.
pub struct UpstreamSession {
    config: UpstreamConfig,
    state: SessionState,
    rate_limiter: AdaptiveRateLimiter,
    backoff: ExponentialBackoff,
    resumption_handle: Option<String>,
    pending_client_frames: VecDeque<Vec<u8>>,
    emitter: Arc<dyn EventEmitter>,
}

impl UpstreamSession {
    pub fn new(config: UpstreamConfig, emitter: Arc<dyn EventEmitter>) -> Self {
        let backoff = ExponentialBackoff::new(&config);
        Self {
            config,
            state: SessionState::Idle,
            rate_limiter: AdaptiveRateLimiter::new(),
            backoff,
            resumption_handle: None,
            pending_client_frames: VecDeque::new(),
            emitter,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn resumption_handle(&self) -> Option<&str> {
        self.resumption_handle.as_deref()
    }

    /// Buffers a client audio frame while not yet connected, dropping the
    /// oldest buffered frame once the queue is full.
    pub fn enqueue_pending(&mut self, frame: Vec<u8>) {
        self.pending_client_frames.push_back(frame);
        while self.pending_client_frames.len() > self.config.pending_queue_capacity {
            self.pending_client_frames.pop_front();
            log::warn!("[UpstreamSession] dropped oldest queued client frame (queue full)");
        }
    }

    pub fn take_pending(&mut self) -> VecDeque<Vec<u8>> {
        std::mem::take(&mut self.pending_client_frames)
    }

    /// Opens the upstream WebSocket connection and sends the setup payload.
    pub async fn connect(&mut self) -> DialogResult<UpstreamStream> {
        if self.config.url.is_empty() || self.config.model.is_empty() {
            return Err(DialogError::UpstreamNotConfigured(
                "upstream url/model must be set".to_string(),
            ));
        }

        self.state = SessionState::Connecting;
        let (mut stream, _response) = tokio_tungstenite::connect_async(&self.config.url)
            .await
            .map_err(|e| DialogError::UpstreamClosedRetryable(e.to_string()))?;

        let setup = build_setup_payload(&self.config, self.resumption_handle.as_deref());
        stream
            .send(WsMessage::Text(setup.to_string().into()))
            .await
            .map_err(|e| DialogError::SendFailure(e.to_string()))?;

        self.state = SessionState::Open;
        self.backoff.reset();
        self.emitter.emit_session(SessionEvent::Connected {
            timestamp: crate::utils::now_millis(),
        });
        Ok(stream)
    }

    /// Attempts to send a client audio frame, honoring the adaptive rate
    /// limiter. Returns [`DialogError::RateLimited`] if currently blocked.
    pub async fn send_audio(
        &mut self,
        stream: &mut UpstreamStream,
        audio_base64: &str,
    ) -> DialogResult<()> {
        let now = Instant::now();
        if !self.rate_limiter.allow_send(now) {
            return Err(DialogError::RateLimited {
                retry_after_ms: self.rate_limiter.retry_after_ms(now),
            });
        }
        let payload = build_audio_chunk_payload(audio_base64);
        stream
            .send(WsMessage::Text(payload.to_string().into()))
            .await
            .map_err(|e| DialogError::SendFailure(e.to_string()))?;
        self.rate_limiter.mark_success();
        Ok(())
    }

    /// Sends a raw, already-framed client audio chunk (e.g. a client binary
    /// WebSocket frame), honoring the same rate limiter as [`send_audio`](Self::send_audio).
    pub async fn send_audio_bytes(
        &mut self,
        stream: &mut UpstreamStream,
        pcm: &[u8],
    ) -> DialogResult<()> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(pcm);
        self.send_audio(stream, &encoded).await
    }

    /// Sends an arbitrary normalized client payload upstream, bypassing the
    /// audio rate limiter (used for control/text messages).
    pub async fn send_raw(&mut self, stream: &mut UpstreamStream, payload: Json) -> DialogResult<()> {
        stream
            .send(WsMessage::Text(payload.to_string().into()))
            .await
            .map_err(|e| DialogError::SendFailure(e.to_string()))
    }

    /// Records a rate-limit signal observed from an upstream error payload.
    pub fn note_rate_limited(&mut self) {
        self.rate_limiter.mark_rate_limited(Instant::now());
    }

    /// Records a session-resumption handle advertised by upstream, so the
    /// next [`connect`](Self::connect) can resume rather than start fresh.
    pub fn note_resumption_handle(&mut self, handle: impl Into<String>) {
        self.resumption_handle = Some(handle.into());
    }

    /// Handles a raw WebSocket close, classifying it and computing the next
    /// backoff delay if retryable. Returns `None` for a terminal close.
    pub fn handle_close(&mut self, frame: Option<&CloseFrame<'_>>) -> Option<std::time::Duration> {
        let (code, reason) = frame
            .map(|f| (u16::from(f.code), f.reason.to_string()))
            .unwrap_or((1006, String::new()));
        let close = classify_close(code, &reason);

        self.emitter.emit_session(SessionEvent::UpstreamClosed {
            code: close.code,
            reason: close.reason.clone(),
            retryable: close.retryable,
            timestamp: crate::utils::now_millis(),
        });

        if !close.retryable {
            self.state = SessionState::Closed;
            return None;
        }

        self.state = SessionState::Idle;
        let delay = self.backoff.next();
        self.emitter.emit_session(SessionEvent::Reconnecting {
            attempt: self.backoff.attempt(),
            delay_ms: delay.as_millis() as u64,
            timestamp: crate::utils::now_millis(),
        });
        Some(delay)
    }

    pub fn begin_drain(&mut self) {
        self.state = SessionState::Draining;
    }

    /// Draws a planned-reconnect delay uniformly from the configured
    /// `[planned_reconnect_min_ms, planned_reconnect_max_ms]` window.
    pub fn planned_reconnect_delay(&self) -> std::time::Duration {
        let (min, max) = (
            self.config.planned_reconnect_min_ms,
            self.config.planned_reconnect_max_ms,
        );
        let ms = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        std::time::Duration::from_millis(ms)
    }

    /// Sends a planned-reconnect close to the upstream (code 1012) and moves
    /// the session to `Draining`.
    pub async fn begin_planned_reconnect(&mut self, stream: &mut UpstreamStream) {
        self.state = SessionState::Draining;
        let frame = CloseFrame {
            code: 1012u16.into(),
            reason: "planned_reconnect".into(),
        };
        let _ = stream.send(WsMessage::Close(Some(frame))).await;
    }

    /// Sends a WebSocket ping, used for the upstream heartbeat cadence.
    pub async fn send_ping(&self, stream: &mut UpstreamStream) -> DialogResult<()> {
        stream
            .send(WsMessage::Ping(Vec::new().into()))
            .await
            .map_err(|e| DialogError::SendFailure(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::emitter::NoopEventEmitter;

    fn config() -> UpstreamConfig {
        let mut c = UpstreamConfig::default();
        c.model = "gemini-test".to_string();
        c.url = "wss://example.invalid/ws".to_string();
        c
    }

    #[test]
    fn setup_payload_includes_empty_resumption_when_none() {
        let payload = build_setup_payload(&config(), None);
        assert!(payload["setup"]["sessionResumption"].is_object());
        assert!(payload["setup"]["sessionResumption"].get("handle").is_none());
    }

    #[test]
    fn setup_payload_includes_resumption_handle_when_present() {
        let payload = build_setup_payload(&config(), Some("abc123"));
        assert_eq!(payload["setup"]["sessionResumption"]["handle"], "abc123");
    }

    #[test]
    fn setup_payload_omits_system_instruction_when_empty() {
        let payload = build_setup_payload(&config(), None);
        assert!(payload["setup"].get("systemInstruction").is_none());
    }

    #[test]
    fn audio_chunk_payload_wraps_base64_with_correct_mime() {
        let payload = build_audio_chunk_payload("QUJD");
        assert_eq!(
            payload["realtime_input"]["media_chunks"][0]["mime_type"],
            UPSTREAM_AUDIO_MIME
        );
        assert_eq!(payload["realtime_input"]["media_chunks"][0]["data"], "QUJD");
    }

    #[test]
    fn normalize_client_text_converts_audio_envelope() {
        let payload = normalize_client_text(r#"{"data":"QUJD","mimeType":"audio/pcm;rate=16000"}"#);
        assert_eq!(payload["realtime_input"]["media_chunks"][0]["data"], "QUJD");
    }

    #[test]
    fn normalize_client_text_normalizes_camel_case_realtime_input() {
        let payload = normalize_client_text(r#"{"realtimeInput":{"text":"hi"}}"#);
        assert_eq!(payload["realtime_input"]["text"], "hi");
        assert!(payload.get("realtimeInput").is_none());
    }

    #[test]
    fn normalize_client_text_passes_through_other_json_objects() {
        let payload = normalize_client_text(r#"{"clientContent":{"turns":[]}}"#);
        assert!(payload.get("clientContent").is_some());
    }

    #[test]
    fn normalize_client_text_wraps_plain_text() {
        let payload = normalize_client_text("hello there");
        assert_eq!(payload["realtime_input"]["text"], "hello there");
    }

    #[test]
    fn classify_close_marks_policy_violation_terminal() {
        let result = classify_close(1008, "invalid api key");
        assert!(!result.retryable);
    }

    #[test]
    fn classify_close_marks_abnormal_closure_retryable() {
        let result = classify_close(1006, "");
        assert!(result.retryable);
    }

    #[test]
    fn classify_close_marks_app_auth_range_terminal() {
        let result = classify_close(4001, "unauthorized");
        assert!(!result.retryable);
    }

    #[test]
    fn classify_close_marks_service_restart_and_try_again_retryable() {
        assert!(classify_close(1012, "").retryable);
        assert!(classify_close(1013, "").retryable);
    }

    #[test]
    fn classify_close_marks_rate_limit_reason_retryable() {
        let result = classify_close(1000, "Error 429: too many requests");
        assert!(result.retryable);
    }

    #[test]
    fn classify_close_marks_server_error_reason_retryable() {
        let result = classify_close(1000, "503 Service Unavailable");
        assert!(result.retryable);
    }

    #[test]
    fn classify_close_marks_unknown_reason_terminal() {
        let result = classify_close(1000, "normal closure");
        assert!(!result.retryable);
    }

    #[test]
    fn pending_queue_drops_oldest_on_overflow() {
        let mut config = config();
        config.pending_queue_capacity = 2;
        let mut session = UpstreamSession::new(config, Arc::new(NoopEventEmitter));
        session.enqueue_pending(vec![1]);
        session.enqueue_pending(vec![2]);
        session.enqueue_pending(vec![3]);
        let remaining = session.take_pending();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0], vec![2]);
    }

    #[test]
    fn handle_close_retryable_schedules_backoff() {
        let mut session = UpstreamSession::new(config(), Arc::new(NoopEventEmitter));
        let delay = session.handle_close(None);
        assert!(delay.is_some());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn handle_close_terminal_sets_closed_state() {
        let mut session = UpstreamSession::new(config(), Arc::new(NoopEventEmitter));
        let frame = CloseFrame {
            code: 1008u16.into(),
            reason: "invalid api key".into(),
        };
        let delay = session.handle_close(Some(&frame));
        assert!(delay.is_none());
        assert_eq!(session.state(), SessionState::Closed);
    }
}
