//! Derived-signal computation
//!
//! Baseline-relative normalization (dF/F) and z-scoring of
//! photometry-style traces, with a fixed-length pad/truncate policy so
//! per-trial traces can be stacked into a matrix for averaging.
//!
//! Traces shorter than the nominal length are right-padded with 1.0, a
//! neutral multiplicative identity, so ratio-based metrics downstream are
//! not corrupted the way zero padding would corrupt them.

use crate::align::{align_to_onset, to_sample_index};
use crate::{Error, Result};

/// Nominal trial length used by the acquisition rigs this crate grew up
/// around (2400 samples at 33.33 ms covers an 80 s trial)
pub const DEFAULT_NOMINAL_LEN: usize = 2400;

/// Options for baseline normalization.
///
/// The sample period is always caller-supplied; the library never reads a
/// hardcoded acquisition constant.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Fixed output length; input is right-padded with 1.0 or truncated
    pub nominal_len: usize,
    /// Baseline window in ms, converted to indices via `sample_period`
    pub baseline_window_ms: (f64, f64),
    /// Independent window for the z statistics; defaults to the baseline
    /// window when `None`
    pub zscore_window_ms: Option<(f64, f64)>,
    /// Milliseconds per sample of the input trace
    pub sample_period: f64,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            nominal_len: DEFAULT_NOMINAL_LEN,
            baseline_window_ms: (0.0, 20_000.0),
            zscore_window_ms: None,
            sample_period: 1.0,
        }
    }
}

/// Length-normalize to `nominal_len`: right-pad with 1.0 if shorter,
/// truncate to the first `nominal_len` samples if longer.
#[must_use]
pub fn pad_or_truncate(samples: &[f64], nominal_len: usize) -> Vec<f64> {
    let mut out = vec![1.0; nominal_len];
    let n = samples.len().min(nominal_len);
    out[..n].copy_from_slice(&samples[..n]);
    out
}

/// Convert a trace to dF/F: length-normalize, then subtract the mean of
/// the baseline window.
///
/// # Errors
/// Returns [`Error::ShapeMismatch`] if the baseline window converts to an
/// empty index range.
pub fn normalize_to_baseline(samples: &[f64], opts: &NormalizeOptions) -> Result<Vec<f64>> {
    let data = pad_or_truncate(samples, opts.nominal_len);
    let baseline = window_mean(&data, opts.baseline_window_ms, opts.sample_period)?;
    Ok(data.iter().map(|v| v - baseline).collect())
}

/// Convert a trace to a z-scored dF/F: dF/F first, then standardize by the
/// mean and population standard deviation over the z window **of the dF/F
/// trace**. Non-finite results (zero deviation in the window) map to 0.
///
/// A constant input therefore yields an all-zero output: its dF/F is
/// constant, the window deviation is zero, and the guard zeroes the trace.
///
/// # Errors
/// Returns [`Error::ShapeMismatch`] if either window converts to an empty
/// index range.
pub fn zscore(samples: &[f64], opts: &NormalizeOptions) -> Result<Vec<f64>> {
    let dff = normalize_to_baseline(samples, opts)?;
    let window = opts.zscore_window_ms.unwrap_or(opts.baseline_window_ms);
    let (start, end) = window_indices(dff.len(), window, opts.sample_period)?;
    let slice = &dff[start..end];
    let mean = slice.iter().sum::<f64>() / slice.len() as f64;
    let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / slice.len() as f64;
    let sd = var.sqrt();
    Ok(dff
        .iter()
        .map(|v| {
            let z = (v - mean) / sd;
            if z.is_finite() {
                z
            } else {
                0.0
            }
        })
        .collect())
}

/// Align a trace to an onset and force it to `output_len`, so traces
/// triggered at different absolute onsets stack into a matrix.
#[must_use]
pub fn align_and_truncate_for_average(
    data: &[f64],
    onset_sample_index: usize,
    baseline_ms: f64,
    sample_period: f64,
    output_len: usize,
) -> Vec<f64> {
    let baseline_samples = to_sample_index(baseline_ms, sample_period);
    let aligned = align_to_onset(data, onset_sample_index, baseline_samples, output_len);
    pad_or_truncate(aligned, output_len)
}

/// Centered moving average with edge reflection. `window_len` is clamped
/// to the data length; windows of 1 or less return the input unchanged.
#[must_use]
pub fn smooth(data: &[f64], window_len: usize) -> Vec<f64> {
    if window_len <= 1 || data.len() < 2 {
        return data.to_vec();
    }
    let w = window_len.min(data.len());
    let half = w / 2;
    // Reflect the edges so the average near the boundaries stays unbiased.
    let mut padded = Vec::with_capacity(data.len() + 2 * half);
    padded.extend(data[1..=half].iter().rev());
    padded.extend_from_slice(data);
    padded.extend(data[data.len() - half - 1..data.len() - 1].iter().rev());

    let mut out = Vec::with_capacity(data.len());
    let mut acc: f64 = padded[..w].iter().sum();
    out.push(acc / w as f64);
    for i in w..half * 2 + data.len() {
        acc += padded[i] - padded[i - w];
        out.push(acc / w as f64);
    }
    out.truncate(data.len());
    out
}

fn window_indices(len: usize, window_ms: (f64, f64), dt: f64) -> Result<(usize, usize)> {
    let start = to_sample_index(window_ms.0, dt).min(len);
    let end = to_sample_index(window_ms.1, dt).min(len);
    if start >= end {
        return Err(Error::ShapeMismatch {
            expected: start + 1,
            actual: end,
        });
    }
    Ok((start, end))
}

fn window_mean(data: &[f64], window_ms: (f64, f64), dt: f64) -> Result<f64> {
    let (start, end) = window_indices(data.len(), window_ms, dt)?;
    let slice = &data[start..end];
    Ok(slice.iter().sum::<f64>() / slice.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_or_truncate_lengths() {
        let long: Vec<f64> = (0..3000).map(f64::from).collect();
        let truncated = pad_or_truncate(&long, DEFAULT_NOMINAL_LEN);
        assert_eq!(truncated.len(), 2400);
        assert!((truncated[2399] - 2399.0).abs() < f64::EPSILON);

        let short = vec![2.0; 1000];
        let padded = pad_or_truncate(&short, DEFAULT_NOMINAL_LEN);
        assert_eq!(padded.len(), 2400);
        assert!(padded[1000..].iter().all(|&v| (v - 1.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_dff_concrete_scenario() {
        let samples = [5.0, 5.0, 5.0, 5.0, 10.0, 10.0, 10.0, 10.0];
        let opts = NormalizeOptions {
            nominal_len: 8,
            baseline_window_ms: (0.0, 4.0),
            zscore_window_ms: None,
            sample_period: 1.0,
        };
        let dff = normalize_to_baseline(&samples, &opts).unwrap();
        assert_eq!(dff, vec![0.0, 0.0, 0.0, 0.0, 5.0, 5.0, 5.0, 5.0]);
        // zero deviation in the baseline window of the dff trace:
        // degenerate, guarded to all zeros
        let z = zscore(&samples, &opts).unwrap();
        assert!(z.iter().all(|&v| v == 0.0));
        // an independent z window over the step uses nonzero stats
        let opts_wide = NormalizeOptions {
            zscore_window_ms: Some((0.0, 8.0)),
            ..opts
        };
        let z = zscore(&samples, &opts_wide).unwrap();
        assert!(z.iter().any(|&v| v != 0.0));
        assert!((z[0] + 1.0).abs() < 1e-12);
        assert!((z[4] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_input_is_degenerate_but_finite() {
        let samples = vec![3.5; 100];
        let opts = NormalizeOptions {
            nominal_len: 100,
            baseline_window_ms: (0.0, 50.0),
            zscore_window_ms: None,
            sample_period: 1.0,
        };
        let dff = normalize_to_baseline(&samples, &opts).unwrap();
        assert!(dff.iter().all(|&v| v.abs() < 1e-12));
        let z = zscore(&samples, &opts).unwrap();
        assert!(z.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_sample_period_is_honored() {
        // same window in ms covers different index ranges at different dt
        let samples: Vec<f64> = (0..100).map(f64::from).collect();
        let opts = NormalizeOptions {
            nominal_len: 100,
            baseline_window_ms: (0.0, 100.0),
            zscore_window_ms: None,
            sample_period: 10.0,
        };
        // baseline = mean(samples[0..10]) = 4.5
        let dff = normalize_to_baseline(&samples, &opts).unwrap();
        assert!((dff[0] + 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_baseline_window_is_error() {
        let opts = NormalizeOptions {
            nominal_len: 10,
            baseline_window_ms: (5.0, 5.0),
            zscore_window_ms: None,
            sample_period: 1.0,
        };
        let err = normalize_to_baseline(&[1.0; 10], &opts).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_align_and_truncate_for_average() {
        let data: Vec<f64> = (0..100).map(f64::from).collect();
        // onset 50, 10 ms baseline at dt=1 -> starts at index 40
        let out = align_and_truncate_for_average(&data, 50, 10.0, 1.0, 30);
        assert_eq!(out.len(), 30);
        assert!((out[0] - 40.0).abs() < f64::EPSILON);
        // onset near the end: tail is padded with 1.0
        let out = align_and_truncate_for_average(&data, 95, 0.0, 1.0, 30);
        assert_eq!(out.len(), 30);
        assert!((out[0] - 95.0).abs() < f64::EPSILON);
        assert!((out[10] - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_smooth_preserves_length_and_mean_of_constant() {
        let data = vec![2.0; 50];
        let out = smooth(&data, 7);
        assert_eq!(out.len(), 50);
        assert!(out.iter().all(|&v| (v - 2.0).abs() < 1e-12));
        // window of 1 is the identity
        assert_eq!(smooth(&data, 1), data);
    }

    #[test]
    fn test_smooth_flattens_a_spike() {
        let mut data = vec![0.0; 21];
        data[10] = 10.0;
        let out = smooth(&data, 5);
        assert_eq!(out.len(), 21);
        assert!(out[10] < 10.0);
        assert!(out[8] > 0.0);
    }
}
