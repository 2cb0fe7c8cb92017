use ergsync::{reconcile, resolve, Bias, Params, Profile, Sample, Segment};
use proptest::prelude::*;

const EPS: f64 = 0.01;

/// Strictly increasing sample times (at least 1s apart) with arbitrary watts.
fn profile_strategy() -> impl Strategy<Value = Vec<Sample>> {
    prop::collection::vec((1.0f64..120.0, 0.0f64..600.0), 1..30).prop_map(|steps| {
        let mut t = 0.0;
        steps
            .into_iter()
            .map(|(gap, value)| {
                let sample = Sample::new(t, value);
                t += gap;
                sample
            })
            .collect()
    })
}

fn segments_strategy() -> impl Strategy<Value = Vec<Segment>> {
    prop::collection::vec(1u32..900, 0..20).prop_map(|durations| {
        durations
            .into_iter()
            .enumerate()
            .map(|(i, d)| Segment::new(format!("Step {}", i + 1), d as f64))
            .collect()
    })
}

proptest! {
    #[test]
    fn duplicate_timestamp_bias(
        mut samples in profile_strategy(),
        pick in any::<prop::sample::Index>(),
        before in 0.0f64..600.0,
        after in 0.0f64..600.0,
    ) {
        prop_assume!((before - after).abs() > 1e-6);
        let idx = pick.index(samples.len());
        let t = samples[idx].t;
        samples[idx].value = before;
        samples.insert(idx + 1, Sample::new(t, after));

        let profile = Profile::new(&samples).unwrap();
        prop_assert_eq!(resolve(&profile, t, Bias::Before, EPS), before);
        prop_assert_eq!(resolve(&profile, t, Bias::After, EPS), after);
    }

    #[test]
    fn clamping_ignores_bias(samples in profile_strategy(), past in 0.0f64..1e5) {
        let profile = Profile::new(&samples).unwrap();
        let first = samples[0];
        let last = samples[samples.len() - 1];
        for bias in [Bias::Before, Bias::After] {
            prop_assert_eq!(resolve(&profile, last.t + past, bias, EPS), last.value);
            prop_assert_eq!(resolve(&profile, first.t - past, bias, EPS), first.value);
        }
    }

    #[test]
    fn interpolation_is_monotone(
        p1 in 0.0f64..500.0,
        rise in 0.1f64..500.0,
        span in 1.0f64..600.0,
        a in 0.0f64..1.0,
        b in 0.0f64..1.0,
    ) {
        let samples = vec![Sample::new(0.0, p1), Sample::new(span, p1 + rise)];
        let profile = Profile::new(&samples).unwrap();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let v_lo = resolve(&profile, lo * span, Bias::After, EPS);
        let v_hi = resolve(&profile, hi * span, Bias::After, EPS);
        prop_assert!(v_lo <= v_hi + 1e-9);
    }

    #[test]
    fn coverage_and_steadiness(
        segments in segments_strategy(),
        samples in profile_strategy(),
        threshold in 0.01f64..0.5,
    ) {
        let params = Params { steady_threshold: threshold, ..Params::default() };
        let out = reconcile(&segments, &samples, &params).unwrap();
        prop_assert_eq!(out.len(), segments.len());

        let total: f64 = segments.iter().map(|s| s.duration_s).sum();
        let covered: f64 = out.iter().map(|i| i.duration_s).sum();
        prop_assert!((total - covered).abs() < 1e-6);

        if let Some(first) = out.first() {
            prop_assert_eq!(first.start_s, 0.0);
        }
        for pair in out.windows(2) {
            prop_assert_eq!(pair[1].start_s, pair[0].end_s);
        }
        for interval in &out {
            let expected = interval.start_value == 0.0
                || (interval.end_value - interval.start_value).abs() / interval.start_value
                    < threshold;
            prop_assert_eq!(interval.is_steady, expected);
            prop_assert_eq!(interval.average_value, (interval.start_value + interval.end_value) / 2.0);
        }
    }
}
