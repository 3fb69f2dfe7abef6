//! Join scheduler (C10): decides the crossfade length at a chunk boundary
//! from the RMS delta between the outgoing tail and incoming head.

use crate::protocol_constants::{
    JOIN_CROSSFADE_MAX_MS, JOIN_CROSSFADE_MIN_MS, JOIN_RMS_DELTA_SATURATION,
    JOIN_RMS_DELTA_THRESHOLD,
};

use super::windows::rms;

/// Decides how many milliseconds of crossfade to apply at a join, given the
/// RMS levels measured just before and after the boundary.
///
/// Below [`JOIN_RMS_DELTA_THRESHOLD`] the join is seamless and no crossfade
/// is applied. Above [`JOIN_RMS_DELTA_SATURATION`] the crossfade saturates at
/// [`JOIN_CROSSFADE_MAX_MS`]. In between, the length interpolates linearly.
pub fn decide_crossfade_ms(prev_tail_rms: f32, next_head_rms: f32) -> u64 {
    let delta = (prev_tail_rms - next_head_rms).abs();
    if delta <= JOIN_RMS_DELTA_THRESHOLD {
        return 0;
    }
    if delta >= JOIN_RMS_DELTA_SATURATION {
        return JOIN_CROSSFADE_MAX_MS;
    }
    let span = JOIN_RMS_DELTA_SATURATION - JOIN_RMS_DELTA_THRESHOLD;
    let t = (delta - JOIN_RMS_DELTA_THRESHOLD) / span;
    let ms_span = (JOIN_CROSSFADE_MAX_MS - JOIN_CROSSFADE_MIN_MS) as f32;
    JOIN_CROSSFADE_MIN_MS + (t * ms_span).round() as u64
}

/// Convenience wrapper measuring RMS of the tail/head windows directly.
pub fn decide_crossfade_ms_for_chunks(prev_tail: &[i16], next_head: &[i16]) -> u64 {
    decide_crossfade_ms(rms(prev_tail), rms(next_head))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matched_levels_need_no_crossfade() {
        assert_eq!(decide_crossfade_ms(0.5, 0.5), 0);
    }

    #[test]
    fn small_delta_below_threshold_needs_no_crossfade() {
        assert_eq!(decide_crossfade_ms(0.5, 0.5 + JOIN_RMS_DELTA_THRESHOLD * 0.5), 0);
    }

    #[test]
    fn large_delta_saturates_at_max() {
        assert_eq!(decide_crossfade_ms(0.9, 0.0), JOIN_CROSSFADE_MAX_MS);
    }

    #[test]
    fn mid_delta_interpolates_between_min_and_max() {
        let mid_delta = (JOIN_RMS_DELTA_THRESHOLD + JOIN_RMS_DELTA_SATURATION) / 2.0;
        let ms = decide_crossfade_ms(mid_delta, 0.0);
        assert!(ms > JOIN_CROSSFADE_MIN_MS && ms < JOIN_CROSSFADE_MAX_MS);
    }
}
