//! WebSocket handler for the browser client connection.
//!
//! Each connection owns one upstream session, segmentation engine, and
//! caption processor; audio and transcript flow in a single cooperative
//! task (no shared mutable state across connections beyond the broadcast
//! event channel). The upstream connection reconnects in place (planned or
//! reactive) without tearing down the client-facing socket or the
//! segmentation/caption state.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use base64::Engine;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::api::AppState;
use crate::caption::CaptionProcessor;
use crate::error::DialogError;
use crate::events::{BroadcastEvent, EventEmitter, SegmentEvent, SessionEvent};
use crate::protocol_constants::{WS_HEARTBEAT_CHECK_INTERVAL_SECS, WS_HEARTBEAT_TIMEOUT_SECS};
use crate::segment::{self, EngineEvent, SegmentationEngine};
use crate::upstream::session::normalize_client_text;
use crate::upstream::{UpstreamSession, UpstreamStream};

/// Incoming control messages the client can send as JSON text. Anything else
/// (audio envelopes, raw passthrough, plain text) is normalized and forwarded
/// upstream instead of being matched here.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsControl {
    Heartbeat,
    Interrupt,
}

/// Outgoing message envelope to the browser client.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsOutgoing<'a> {
    Event(&'a BroadcastEvent),
    HeartbeatAck,
    Error { message: String },
}

impl<'a> WsOutgoing<'a> {
    fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self).ok().map(|s| Message::Text(s.into()))
    }
}

/// Derives the `turn-N#seq` caption key for the current turn, handing out a
/// fresh `seq` after each commit and resetting to `0` whenever the
/// segmentation engine's turn id moves on.
#[derive(Default)]
struct CaptionKeyTracker {
    turn_id: u64,
    seq: u64,
}

impl CaptionKeyTracker {
    fn key_for(&mut self, engine_turn_id: u64) -> String {
        if engine_turn_id != self.turn_id {
            self.turn_id = engine_turn_id;
            self.seq = 0;
        }
        format!("turn-{}#{}", self.turn_id, self.seq)
    }

    fn advance(&mut self) {
        self.seq += 1;
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.event_bridge.subscribe();
    let mut last_client_activity = Instant::now();
    let session_id = uuid::Uuid::new_v4().to_string();

    let config = state.config.read().clone();
    let mut engine = SegmentationEngine::new(config.segmenter.clone());
    let mut caption = CaptionProcessor::new(&config.caption);
    let mut caption_key = CaptionKeyTracker::default();
    let mut upstream = UpstreamSession::new(config.upstream.clone(), state.event_bridge.clone());

    let mut upstream_stream = match upstream.connect().await {
        Ok(stream) => stream,
        Err(err) => {
            log::warn!("[WS] upstream connect failed: {err}");
            if let Some(msg) = (WsOutgoing::Error { message: err.to_string() }).to_message() {
                let _ = sender.send(msg).await;
            }
            return;
        }
    };

    let mut heartbeat_check = tokio::time::interval(Duration::from_secs(WS_HEARTBEAT_CHECK_INTERVAL_SECS));
    heartbeat_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut tick_interval = tokio::time::interval(Duration::from_millis(100));
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut planned_reconnect = Box::pin(tokio::time::sleep(upstream.planned_reconnect_delay()));
    let mut upstream_ping = upstream_ping_interval(config.upstream.heartbeat_interval_ms);

    'session: loop {
        tokio::select! {
            msg = receiver.next() => {
                last_client_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_text(&text, &mut sender, &mut engine, &state, &mut upstream, &mut upstream_stream).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        match upstream.send_audio_bytes(&mut upstream_stream, &bytes).await {
                            Ok(()) => {}
                            Err(DialogError::RateLimited { retry_after_ms }) => {
                                log::debug!("[WS] client audio rate limited, retry in {retry_after_ms}ms");
                            }
                            Err(e) => log::warn!("[WS] failed to forward client audio upstream: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break 'session,
                    _ => {}
                }
            }
            upstream_msg = upstream_stream.next() => {
                let now = Instant::now();
                match upstream_msg {
                    Some(Ok(tokio_tungstenite::tungstenite::Message::Text(text))) => {
                        process_upstream_text(&text, &session_id, &mut sender, &mut engine, &mut caption, &mut caption_key, &mut upstream, &state, now).await;
                    }
                    Some(Ok(tokio_tungstenite::tungstenite::Message::Binary(bytes))) => {
                        match std::str::from_utf8(&bytes) {
                            Ok(text) => {
                                let text = text.to_string();
                                process_upstream_text(&text, &session_id, &mut sender, &mut engine, &mut caption, &mut caption_key, &mut upstream, &state, now).await;
                            }
                            Err(_) => {
                                if sender.send(Message::Binary(bytes.to_vec().into())).await.is_err() {
                                    break 'session;
                                }
                                engine.push_audio(&bytes);
                                let key = caption_key.key_for(engine.turn_id());
                                caption.note_audio_activity(&key, now);
                            }
                        }
                    }
                    Some(Ok(tokio_tungstenite::tungstenite::Message::Close(frame))) => {
                        let delay = upstream.handle_close(frame.as_ref());
                        for event in engine.force_complete() {
                            emit_engine_event(&state, &session_id, event);
                        }
                        match delay {
                            Some(delay) => {
                                tokio::time::sleep(delay).await;
                                match upstream.connect().await {
                                    Ok(stream) => {
                                        upstream_stream = stream;
                                        planned_reconnect.set(tokio::time::sleep(upstream.planned_reconnect_delay()));
                                        upstream_ping = upstream_ping_interval(config.upstream.heartbeat_interval_ms);
                                    }
                                    Err(e) => {
                                        log::warn!("[WS] reconnect failed: {e}");
                                        break 'session;
                                    }
                                }
                            }
                            None => break 'session,
                        }
                    }
                    Some(Err(e)) => {
                        log::warn!("[WS] upstream socket error: {e}");
                        break 'session;
                    }
                    None => break 'session,
                    _ => {}
                }
            }
            Ok(event) = broadcast_rx.recv() => {
                if let Some(msg) = (WsOutgoing::Event(&event)).to_message() {
                    if sender.send(msg).await.is_err() {
                        break 'session;
                    }
                }
            }
            _ = tick_interval.tick() => {
                let now = Instant::now();
                for event in engine.tick(now) {
                    emit_engine_event(&state, &session_id, event);
                }
                for commit in caption.tick(now) {
                    log::trace!("[WS] caption commit {} ({:?}): {}", commit.key, commit.reason, commit.text);
                    caption_key.advance();
                }
            }
            _ = heartbeat_check.tick() => {
                if last_client_activity.elapsed() > Duration::from_secs(WS_HEARTBEAT_TIMEOUT_SECS) {
                    log::warn!("[WS] client heartbeat timeout, closing connection");
                    break 'session;
                }
            }
            _ = &mut planned_reconnect => {
                log::info!("[WS] planned-reconnect timer fired, draining upstream");
                upstream.begin_planned_reconnect(&mut upstream_stream).await;
            }
            _ = upstream_ping.tick(), if config.upstream.heartbeat_interval_ms > 0 => {
                if let Err(e) = upstream.send_ping(&mut upstream_stream).await {
                    log::warn!("[WS] upstream heartbeat ping failed: {e}");
                }
            }
        }
    }

    for event in engine.force_complete() {
        emit_engine_event(&state, &session_id, event);
    }
    state.event_bridge.emit_session(SessionEvent::UpstreamClosed {
        code: 1000,
        reason: "client connection ended".to_string(),
        retryable: false,
        timestamp: crate::utils::now_millis(),
    });
}

/// Builds the periodic upstream-ping interval. The `select!` arm is gated on
/// `heartbeat_interval_ms > 0`, so a disabled heartbeat never actually fires.
fn upstream_ping_interval(heartbeat_interval_ms: u64) -> tokio::time::Interval {
    let period = Duration::from_millis(heartbeat_interval_ms.max(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval
}

/// Parses and dispatches one client text frame: a recognized control message
/// (heartbeat/interrupt) is handled locally; anything else is normalized and
/// forwarded upstream per the client-text wire rules.
async fn handle_client_text(
    text: &str,
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    engine: &mut SegmentationEngine,
    state: &AppState,
    upstream: &mut UpstreamSession,
    upstream_stream: &mut UpstreamStream,
) {
    if let Ok(control) = serde_json::from_str::<WsControl>(text) {
        match control {
            WsControl::Heartbeat => {
                if let Some(msg) = (WsOutgoing::HeartbeatAck).to_message() {
                    let _ = sender.send(msg).await;
                }
            }
            WsControl::Interrupt => {
                for event in engine.force_complete() {
                    emit_engine_event(state, "", event);
                }
            }
        }
        return;
    }

    let payload = normalize_client_text(text);
    if let Err(e) = upstream.send_raw(upstream_stream, payload).await {
        log::warn!("[WS] failed to forward client message upstream: {e}");
    }
}

/// Processes one upstream text payload: harvests audio chunks and forwards
/// them as binary frames, feeds the segmentation engine and caption
/// processor, forwards the sanitized JSON to the client, and reacts to
/// `goAway`/session-resumption signals.
async fn process_upstream_text(
    text: &str,
    session_id: &str,
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    engine: &mut SegmentationEngine,
    caption: &mut CaptionProcessor,
    caption_key: &mut CaptionKeyTracker,
    upstream: &mut UpstreamSession,
    state: &AppState,
    now: Instant,
) {
    let payload: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return,
    };

    let key = caption_key.key_for(engine.turn_id());

    let extracted = segment::extract_audio(&payload);
    for chunk in &extracted.chunks {
        let _ = sender.send(Message::Binary(chunk.bytes.clone().into())).await;
        engine.push_audio(&chunk.bytes);
        caption.note_audio_activity(&key, now);
    }

    if let Some(transcript) = segment::extract_transcript(&payload) {
        caption.ingest(&key, &transcript, now);
        for event in engine.ingest_payload(Some(&transcript), now) {
            emit_engine_event(state, session_id, event);
        }
    }

    engine.signal_generation_complete(&payload, now);
    if segment::is_generation_complete(&payload) {
        if let Some(commit) = caption.force_commit(&key) {
            log::trace!("[WS] caption commit {} ({:?}): {}", commit.key, commit.reason, commit.text);
            caption_key.advance();
        }
    }

    if let Some(handle) = extract_resumption_handle(&payload) {
        upstream.note_resumption_handle(handle);
    }

    if let Ok(sanitized_text) = serde_json::to_string(&extracted.sanitized) {
        let _ = sender.send(Message::Text(sanitized_text.into())).await;
    }

    if extracted.go_away {
        log::info!("[WS] upstream signaled goAway, draining");
        upstream.begin_drain();
    }
}

/// Looks for an opaque session-resumption handle under either the
/// `sessionResumption`/`session_resumption` setup-echo shape or a bare
/// `session` snapshot object.
fn extract_resumption_handle(payload: &serde_json::Value) -> Option<String> {
    for key in ["sessionResumption", "session_resumption", "session"] {
        if let Some(handle) = payload.get(key).and_then(|v| v.get("handle")).and_then(|v| v.as_str()) {
            return Some(handle.to_string());
        }
    }
    None
}

fn emit_engine_event(state: &AppState, session_id: &str, event: EngineEvent) {
    match event {
        EngineEvent::Segment(seg) => {
            state.event_bridge.emit_segment(SegmentEvent::SegmentCommit {
                segment_id: seg.segment_id,
                turn_id: seg.turn_id,
                index: seg.index,
                text: seg.text,
                audio_base64: base64::engine::general_purpose::STANDARD.encode(&seg.audio_pcm16le),
                duration_ms: seg.duration_ms,
                nominal_duration_ms: seg.nominal_duration_ms,
                audio_bytes: seg.audio_pcm16le.len(),
                audio_samples: seg.audio_samples,
                timestamp: crate::utils::now_millis(),
            });
        }
        EngineEvent::Turn(turn) => {
            state.event_bridge.emit_segment(SegmentEvent::TurnCommit {
                turn_id: turn.turn_id,
                final_text: turn.final_text,
                segment_count: turn.segment_count,
                timestamp: crate::utils::now_millis(),
            });
        }
        EngineEvent::Diagnostics(diag) => {
            state.event_bridge.emit_segment(SegmentEvent::SegmentDiagnostics {
                session_id: session_id.to_string(),
                turn_id: diag.turn_id,
                transcript_length: diag.transcript_length,
                partial_length: diag.partial_length,
                pending_text_count: diag.pending_text_count,
                pending_text_length: diag.pending_text_length,
                pending_audio_bytes: diag.pending_audio_bytes,
                audio_chunk_count: diag.audio_chunk_count,
                audio_chunk_bytes: diag.audio_chunk_bytes,
                audio_chunk_min: diag.audio_chunk_min,
                audio_chunk_max: diag.audio_chunk_max,
                zero_audio_segments: diag.zero_audio_segments,
                timestamp: crate::utils::now_millis(),
            });
        }
    }
}
