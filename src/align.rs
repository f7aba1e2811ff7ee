//! Time alignment and resampling
//!
//! Converts between sample index, relative time and absolute time across
//! series with different sample periods, and resamples one series onto
//! another's timebase via piecewise-linear interpolation.
//!
//! Two index conversions coexist deliberately:
//! - start-boundary (cursor) semantics clamp to `>= 0` only
//!   ([`to_sample_index`]), because a cursor left of the data simply means
//!   "from the beginning";
//! - indexing (event) semantics additionally clamp to the last valid index
//!   ([`to_clamped_index`]), because the result must address an existing
//!   sample.

use crate::series::Series;
use crate::{Error, Result};

/// Convert a time in ms to a sample index: `floor(time / dt)`, clamped to
/// `>= 0`. Start-boundary semantics; see the module docs.
#[must_use]
pub fn to_sample_index(time_ms: f64, dt: f64) -> usize {
    let idx = (time_ms / dt).floor();
    if idx <= 0.0 {
        0
    } else {
        idx as usize
    }
}

/// Convert a time in ms to an index into a series of length `len`:
/// `floor(time / dt)` clamped to `[0, len - 1]`. Indexing semantics.
#[must_use]
pub fn to_clamped_index(time_ms: f64, dt: f64, len: usize) -> usize {
    let idx = to_sample_index(time_ms, dt);
    idx.min(len.saturating_sub(1))
}

/// Convert two cursor positions (in ms) to a sample range over a series of
/// length `len` with sample period `dt`: round each to the nearest sample,
/// swap so start <= end, clamp start to `>= 0` and end to `<= len`.
#[must_use]
pub fn cursor_range(c1_ms: f64, c2_ms: f64, dt: f64, len: usize) -> (usize, usize) {
    let (lo, hi) = if c2_ms < c1_ms {
        (c2_ms, c1_ms)
    } else {
        (c1_ms, c2_ms)
    };
    let start = ((lo / dt).round().max(0.0)) as usize;
    let end = ((hi / dt).round().max(0.0) as usize).min(len);
    (start.min(end), end)
}

/// Extract the window `[onset - baseline, onset - baseline + window)` from
/// `data`, truncated to the intersection with `[0, len)`. Never errors: the
/// result may be shorter than `window_samples` (or empty) when the window
/// runs off either end. Callers needing a fixed length pad explicitly, see
/// [`crate::derived::pad_or_truncate`].
#[must_use]
pub fn align_to_onset(
    data: &[f64],
    onset_sample_index: usize,
    baseline_samples: usize,
    window_samples: usize,
) -> &[f64] {
    let raw_start = onset_sample_index as i64 - baseline_samples as i64;
    let raw_end = raw_start + window_samples as i64;
    let start = raw_start.clamp(0, data.len() as i64) as usize;
    let end = raw_end.clamp(0, data.len() as i64) as usize;
    &data[start..end]
}

/// Resample `source` onto `target_axis_ms` by piecewise-linear
/// interpolation over the source's native time axis (`index * dt`).
///
/// Target points must lie inside the source's covered range
/// `[0, (len - 1) * dt]`; clip the axis first with [`clip_axis_to`].
/// Evaluating exactly at a native timestamp reproduces that sample.
///
/// # Errors
/// Returns [`Error::ResampleOutOfRange`] for the first target point
/// outside the covered range, and [`Error::ShapeMismatch`] if the source
/// has fewer than two samples.
pub fn resample(source: &Series, target_axis_ms: &[f64]) -> Result<Vec<f64>> {
    let samples = source.samples();
    if samples.len() < 2 {
        return Err(Error::ShapeMismatch {
            expected: 2,
            actual: samples.len(),
        });
    }
    let dt = source.sample_period();
    let t_max = (samples.len() - 1) as f64 * dt;

    let mut out = Vec::with_capacity(target_axis_ms.len());
    for &t in target_axis_ms {
        if !(0.0..=t_max).contains(&t) {
            return Err(Error::ResampleOutOfRange {
                t,
                t_min: 0.0,
                t_max,
            });
        }
        let pos = t / dt;
        let k = (pos.floor() as usize).min(samples.len() - 2);
        let frac = pos - k as f64;
        out.push(samples[k] + frac * (samples[k + 1] - samples[k]));
    }
    Ok(out)
}

/// Drop target-axis points that fall outside `source`'s covered native
/// range, so heterogeneous channels can be resampled onto a shared
/// timebase without range errors.
#[must_use]
pub fn clip_axis_to(source: &Series, target_axis_ms: &[f64]) -> Vec<f64> {
    if source.is_empty() {
        return Vec::new();
    }
    let t_max = (source.len() - 1) as f64 * source.sample_period();
    target_axis_ms
        .iter()
        .copied()
        .filter(|&t| (0.0..=t_max).contains(&t))
        .collect()
}

/// Build a uniform time axis at step `dt_ms` spanning a list of detected
/// onset times (ms): points `first + i * dt` for `i` in `0..n` where `n`
/// is the number of whole steps between the first and last onset
/// (end-exclusive). Used to put frame-clocked channels on a common
/// timebase during import.
#[must_use]
pub fn onsets_to_common_axis(onset_times_ms: &[f64], dt_ms: f64) -> Vec<f64> {
    let (Some(&first), Some(&last)) = (onset_times_ms.first(), onset_times_ms.last()) else {
        return Vec::new();
    };
    if last <= first || dt_ms <= 0.0 {
        return Vec::new();
    }
    let n = ((last - first) / dt_ms).floor() as usize;
    (0..n).map(|i| first + i as f64 * dt_ms).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_sample_index_semantics() {
        assert_eq!(to_sample_index(0.0, 1.0), 0);
        assert_eq!(to_sample_index(99.9, 10.0), 9);
        assert_eq!(to_sample_index(-50.0, 10.0), 0);
        assert_eq!(to_clamped_index(5_000.0, 10.0, 100), 99);
        assert_eq!(to_clamped_index(250.0, 10.0, 100), 25);
    }

    #[test]
    fn test_cursor_range_swaps_and_clamps() {
        // swapped cursors
        assert_eq!(cursor_range(30.0, 10.0, 1.0, 100), (10, 30));
        // clamp below zero and above data length
        assert_eq!(cursor_range(-5.0, 250.0, 1.0, 100), (0, 100));
        // rounding, not flooring
        assert_eq!(cursor_range(14.6, 20.4, 10.0, 100), (1, 2));
    }

    #[test]
    fn test_align_to_onset_exact_length_inside() {
        let data: Vec<f64> = (0..100).map(f64::from).collect();
        let w = align_to_onset(&data, 50, 10, 30);
        assert_eq!(w.len(), 30);
        assert!((w[0] - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_align_to_onset_truncates_both_ends() {
        let data = [1.0, 2.0, 3.0, 4.0];
        // window starts before the data
        assert_eq!(align_to_onset(&data, 1, 3, 4), &[1.0, 2.0]);
        // window runs past the end
        assert_eq!(align_to_onset(&data, 3, 0, 10), &[4.0]);
        // fully outside
        assert!(align_to_onset(&data, 0, 10, 5).is_empty());
    }

    #[test]
    fn test_resample_reproduces_knots() {
        let s = Series::new("s", vec![0.0, 10.0, -4.0, 6.0], 2.0).unwrap();
        let out = resample(&s, &[0.0, 2.0, 4.0, 6.0]).unwrap();
        for (a, b) in out.iter().zip(s.samples()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_resample_midpoints_linear() {
        let s = Series::new("s", vec![0.0, 10.0], 10.0).unwrap();
        let out = resample(&s, &[2.5, 5.0, 7.5]).unwrap();
        assert!((out[0] - 2.5).abs() < 1e-12);
        assert!((out[1] - 5.0).abs() < 1e-12);
        assert!((out[2] - 7.5).abs() < 1e-12);
    }

    #[test]
    fn test_resample_out_of_range_is_error() {
        let s = Series::new("s", vec![0.0, 1.0, 2.0], 1.0).unwrap();
        let err = resample(&s, &[1.0, 2.5]).unwrap_err();
        assert!(matches!(err, Error::ResampleOutOfRange { .. }));
        assert!(resample(&s, &[-0.1]).is_err());
    }

    #[test]
    fn test_clip_axis_to() {
        let s = Series::new("s", vec![0.0; 5], 10.0).unwrap(); // covers 0..=40
        let clipped = clip_axis_to(&s, &[-10.0, 0.0, 25.0, 40.0, 41.0]);
        assert_eq!(clipped, vec![0.0, 25.0, 40.0]);
    }

    #[test]
    fn test_onsets_to_common_axis() {
        let onsets = [100.0, 120.3, 139.8, 160.1];
        let axis = onsets_to_common_axis(&onsets, 20.0);
        assert_eq!(axis, vec![100.0, 120.0, 140.0]);
        assert!(onsets_to_common_axis(&[], 20.0).is_empty());
        assert!(onsets_to_common_axis(&[5.0], 20.0).is_empty());
    }
}
