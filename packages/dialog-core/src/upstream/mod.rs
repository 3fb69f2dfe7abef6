//! Upstream model connection: rate limiting, backoff, and session lifecycle.

pub mod backoff;
pub mod rate_limiter;
pub mod session;

pub use backoff::ExponentialBackoff;
pub use rate_limiter::AdaptiveRateLimiter;
pub use session::{
    build_audio_chunk_payload, build_setup_payload, classify_close, SessionState, UpstreamClosePayload,
    UpstreamSession, UpstreamStream,
};
