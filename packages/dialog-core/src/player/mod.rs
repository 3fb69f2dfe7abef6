//! Client-side-equivalent playback scheduling primitives (C1/C2/C9/C10).
//!
//! These mirror the join/arm/underrun semantics the browser client applies
//! to generated audio, exposed here so the proxy can reason about and test
//! that behavior without a real audio sink.

pub mod core;
pub mod join_scheduler;
pub mod ring_buffer;
pub mod windows;

pub use core::PlayerCore;
pub use join_scheduler::{decide_crossfade_ms, decide_crossfade_ms_for_chunks};
pub use ring_buffer::AudioRingBuffer;
