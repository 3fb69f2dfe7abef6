//! Dialog Core - shared library for the real-time dialog proxy.
//!
//! This crate mediates a bidirectional audio conversation between a
//! browser-style client and an upstream generative "Live" model: it proxies
//! client microphone audio upstream, segments the model's streamed transcript
//! and audio into paired (sentence, audio) commits, schedules caption
//! commits, and manages the upstream session's connection lifecycle
//! (handshake, heartbeats, reconnect/backoff, rate limiting).
//!
//! # Architecture
//!
//! - [`runtime`]: Task spawning abstraction for async runtime independence
//! - [`events`]: Event system for real-time client communication
//! - [`context`]: Network configuration and URL building
//! - [`config`]: Application configuration
//! - [`segment`]: Transcript/audio extraction and the segmentation engine (C5-C7)
//! - [`upstream`]: Upstream session state machine, backoff, rate limiting (C3/C4/C8)
//! - [`player`]: Pull-driven playback buffering and join scheduling (C1/C2/C9/C10)
//! - [`caption`]: Caption debounce/fallback scheduling (C11)
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`Lifecycle`](lifecycle::Lifecycle): Process shutdown control

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod caption;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod player;
pub mod protocol_constants;
pub mod runtime;
pub mod segment;
pub mod upstream;
pub mod utils;
pub mod value;

pub use api::{start_server, AppState, AppStateBuilder, ServerError};
pub use caption::{CaptionCommit, CaptionGuard, CaptionMetrics, CaptionProcessor};
pub use config::Config;
pub use context::{NetworkContext, UrlBuilder};
pub use error::{DialogError, DialogResult, ErrorCode};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EventEmitter, PlayerEvent, SegmentEvent, SessionEvent,
};
pub use lifecycle::{Lifecycle, NoopLifecycle, ServerLifecycle};
pub use player::{decide_crossfade_ms, AudioRingBuffer, PlayerCore};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use segment::{EngineEvent, SegmentCommit, SegmentationEngine, TurnCommit};
pub use upstream::{
    AdaptiveRateLimiter, ExponentialBackoff, SessionState, UpstreamClosePayload, UpstreamSession,
};
pub use utils::now_millis;
