//! Fade curves and signal measurement helpers (C2).

use std::f32::consts::PI;

/// Generates a raised-cosine (Hann half-window) ramp of `len` steps rising
/// from 0.0 to 1.0.
pub fn raised_cosine_ramp_up(len: usize) -> Vec<f32> {
    if len == 0 {
        return Vec::new();
    }
    (0..len)
        .map(|i| {
            let t = i as f32 / len.max(1) as f32;
            0.5 - 0.5 * (PI * t).cos()
        })
        .collect()
}

/// Generates a raised-cosine ramp falling from 1.0 to 0.0.
pub fn raised_cosine_ramp_down(len: usize) -> Vec<f32> {
    raised_cosine_ramp_up(len).into_iter().map(|v| 1.0 - v).collect()
}

/// Applies a fade-in curve to the start of `samples` in place.
pub fn apply_fade_in(samples: &mut [i16], curve: &[f32]) {
    for (sample, gain) in samples.iter_mut().zip(curve.iter()) {
        *sample = (*sample as f32 * gain).round() as i16;
    }
}

/// Applies a fade-out curve to the end of `samples` in place.
pub fn apply_fade_out(samples: &mut [i16], curve: &[f32]) {
    let start = samples.len().saturating_sub(curve.len());
    for (sample, gain) in samples[start..].iter_mut().zip(curve.iter()) {
        *sample = (*sample as f32 * gain).round() as i16;
    }
}

/// Blends the tail of `prev` and the head of `next` over a crossfade of
/// `curve_len` samples, returning the blended region. Caller is responsible
/// for splicing it between the unmodified remainders.
pub fn crossfade(prev_tail: &[i16], next_head: &[i16], curve_len: usize) -> Vec<i16> {
    let len = curve_len.min(prev_tail.len()).min(next_head.len());
    let fade_out = raised_cosine_ramp_down(len);
    let fade_in = raised_cosine_ramp_up(len);
    (0..len)
        .map(|i| {
            let a = prev_tail[prev_tail.len() - len + i] as f32 * fade_out[i];
            let b = next_head[i] as f32 * fade_in[i];
            (a + b).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .collect()
}

/// Root-mean-square level of `samples`, normalized to `[0.0, 1.0]`.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64).powi(2)).sum();
    let mean_sq = sum_sq / samples.len() as f64;
    (mean_sq.sqrt() / i16::MAX as f64) as f32
}

/// Peak absolute level of `samples`, normalized to `[0.0, 1.0]`.
pub fn peak(samples: &[i16]) -> f32 {
    samples
        .iter()
        .map(|&s| (s as f32).abs())
        .fold(0.0_f32, f32::max)
        / i16::MAX as f32
}

/// Searches the first `window` samples of `samples` for a zero crossing
/// (sign change), returning its index. Returns 0 if none is found.
pub fn find_zero_crossing(samples: &[i16], window: usize) -> usize {
    let limit = window.min(samples.len().saturating_sub(1));
    for i in 0..limit {
        let a = samples[i];
        let b = samples[i + 1];
        if (a >= 0) != (b >= 0) {
            return i + 1;
        }
    }
    0
}

/// Resamples `samples` from `from_rate` to `to_rate` via linear interpolation.
pub fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = ((samples.len() as f64) * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;
        let a = samples.get(idx).copied().unwrap_or(0) as f32;
        let b = samples.get(idx + 1).copied().unwrap_or(a as i16) as f32;
        out.push((a + (b - a) * frac).round() as i16);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_up_starts_at_zero_ends_near_one() {
        let ramp = raised_cosine_ramp_up(8);
        assert!(ramp[0] < 0.1);
        assert!(ramp[7] > 0.8);
    }

    #[test]
    fn ramp_down_is_mirror_of_ramp_up() {
        let up = raised_cosine_ramp_up(8);
        let down = raised_cosine_ramp_down(8);
        for (u, d) in up.iter().zip(down.iter()) {
            assert!((u + d - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&[0, 0, 0]), 0.0);
    }

    #[test]
    fn rms_of_full_scale_is_near_one() {
        let samples = vec![i16::MAX; 100];
        assert!(rms(&samples) > 0.99);
    }

    #[test]
    fn find_zero_crossing_detects_sign_change() {
        let samples = [100, 50, -10, -40];
        assert_eq!(find_zero_crossing(&samples, 4), 2);
    }

    #[test]
    fn find_zero_crossing_returns_zero_when_absent() {
        let samples = [100, 90, 80, 70];
        assert_eq!(find_zero_crossing(&samples, 4), 0);
    }

    #[test]
    fn resample_linear_upsamples_to_target_length() {
        let samples = vec![0i16, 1000, 2000, 1000, 0];
        let out = resample_linear(&samples, 16000, 24000);
        assert!(out.len() > samples.len());
    }

    #[test]
    fn resample_linear_noop_when_rates_match() {
        let samples = vec![1, 2, 3];
        assert_eq!(resample_linear(&samples, 16000, 16000), samples);
    }

    #[test]
    fn crossfade_length_matches_requested_curve() {
        let prev = vec![1000i16; 20];
        let next = vec![-1000i16; 20];
        let blended = crossfade(&prev, &next, 10);
        assert_eq!(blended.len(), 10);
    }
}
