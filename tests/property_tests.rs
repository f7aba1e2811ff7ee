//! Property-based tests for the alignment arithmetic, normalization
//! policy and store invariants.

use ethotrace::align;
use ethotrace::derived;
use ethotrace::series::Series;
use ethotrace::store::{Node, Store};
use proptest::prelude::*;

/// Non-degenerate sample vectors
fn arb_samples(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(-1000.0f64..1000.0, 2..max_len)
}

/// Positive sample periods in a realistic range (0.1 ms to 1 s)
fn arb_dt() -> impl Strategy<Value = f64> {
    0.1f64..1000.0
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Resampling a series at its own native time points reproduces the
    /// original samples (interpolation identity at knot points).
    #[test]
    fn prop_resample_identity_at_knots(samples in arb_samples(200), dt in arb_dt()) {
        let series = Series::new("s", samples.clone(), dt).unwrap();
        let axis = series.native_time_axis();
        let out = align::resample(&series, &axis).unwrap();
        for (resampled, original) in out.iter().zip(&samples) {
            prop_assert!((resampled - original).abs() < 1e-6 * original.abs().max(1.0));
        }
    }

    /// Any target axis clipped to the source range resamples without error.
    #[test]
    fn prop_clipped_axis_always_resamples(
        samples in arb_samples(100),
        dt in arb_dt(),
        targets in proptest::collection::vec(-1e6f64..1e6, 1..50),
    ) {
        let series = Series::new("s", samples, dt).unwrap();
        let clipped = align::clip_axis_to(&series, &targets);
        prop_assert!(align::resample(&series, &clipped).is_ok());
    }

    /// When the window fits entirely inside the data, the aligned slice
    /// has exactly the requested length.
    #[test]
    fn prop_align_to_onset_exact_length(
        len in 10usize..500,
        onset_frac in 0.0f64..1.0,
        baseline in 0usize..50,
        window in 1usize..100,
    ) {
        let data: Vec<f64> = (0..len).map(|i| i as f64).collect();
        let onset = (onset_frac * len as f64) as usize;
        prop_assume!(onset >= baseline);
        prop_assume!(onset - baseline + window <= len);
        let out = align::align_to_onset(&data, onset, baseline, window);
        prop_assert_eq!(out.len(), window);
    }

    /// The aligned slice is always the intersection with the data range,
    /// never longer than requested and never out of bounds.
    #[test]
    fn prop_align_to_onset_never_exceeds(
        len in 1usize..200,
        onset in 0usize..400,
        baseline in 0usize..400,
        window in 0usize..400,
    ) {
        let data: Vec<f64> = (0..len).map(|i| i as f64).collect();
        let out = align::align_to_onset(&data, onset, baseline, window);
        prop_assert!(out.len() <= window);
        prop_assert!(out.len() <= len);
    }

    /// Length normalization always yields exactly the nominal length, and
    /// padding is the multiplicative identity.
    #[test]
    fn prop_pad_or_truncate_length(samples in arb_samples(400), nominal in 1usize..300) {
        let out = derived::pad_or_truncate(&samples, nominal);
        prop_assert_eq!(out.len(), nominal);
        for &v in out.iter().skip(samples.len()) {
            prop_assert_eq!(v, 1.0);
        }
    }

    /// Cursor ranges are ordered and clamped to the data regardless of
    /// cursor order or position.
    #[test]
    fn prop_cursor_range_ordered_and_clamped(
        c1 in -1e5f64..1e5,
        c2 in -1e5f64..1e5,
        dt in arb_dt(),
        len in 0usize..5000,
    ) {
        let (start, end) = align::cursor_range(c1, c2, dt, len);
        prop_assert!(start <= end);
        prop_assert!(end <= len);
    }

    /// Inserting any number of identically-named children yields unique
    /// display names.
    #[test]
    fn prop_unique_names_never_collide(count in 1usize..30) {
        let mut store = Store::new();
        let root = store.add_root(Node::group("root"));
        let ids: Vec<_> = (0..count)
            .map(|_| store.add_child(root, Node::group("x")))
            .collect();
        let mut names: Vec<String> = ids
            .iter()
            .map(|&id| store.node(id).display_name().to_owned())
            .collect();
        names.sort();
        names.dedup();
        prop_assert_eq!(names.len(), count);
    }
}
