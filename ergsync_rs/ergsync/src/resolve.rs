use serde::{Deserialize, Serialize};

use crate::{Sample, SyncError};

/// Which side of an instantaneous transition a query reports.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Bias {
    /// Value in effect just before the instant (interval ends).
    Before,
    /// Value in effect just after the instant (interval starts).
    After,
}

/// Validated view over power samples: non-empty and sorted by time.
#[derive(Clone, Copy, Debug)]
pub struct Profile<'a> {
    samples: &'a [Sample],
}

impl<'a> Profile<'a> {
    pub fn new(samples: &'a [Sample]) -> Result<Self, SyncError> {
        if samples.is_empty() {
            return Err(SyncError::EmptyProfile);
        }
        for (idx, pair) in samples.windows(2).enumerate() {
            // NaN fails this comparison as well.
            if !(pair[1].t >= pair[0].t) {
                return Err(SyncError::NonMonotonicProfile {
                    index: idx + 1,
                    prev_s: pair[0].t,
                    next_s: pair[1].t,
                });
            }
        }
        if samples[0].t.is_nan() {
            return Err(SyncError::NonMonotonicProfile {
                index: 0,
                prev_s: f64::NAN,
                next_s: f64::NAN,
            });
        }
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &'a [Sample] {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Sample {
        self.samples[0]
    }

    pub fn last(&self) -> Sample {
        self.samples[self.samples.len() - 1]
    }
}

/// Value of the profile at `query_s`.
///
/// Samples within `epsilon_s` of the query form an exact-match band; `After`
/// reports the last sample of the band and `Before` the first. Without a band
/// the value is interpolated between the neighbouring samples, or clamped to
/// the first/last sample outside the profile's span.
pub fn resolve(profile: &Profile<'_>, query_s: f64, bias: Bias, epsilon_s: f64) -> f64 {
    let samples = profile.samples;

    let lo = samples.partition_point(|s| s.t < query_s - epsilon_s);
    let hi = lo + samples[lo..].partition_point(|s| s.t <= query_s + epsilon_s);
    if hi > lo {
        return match bias {
            Bias::Before => samples[lo].value,
            Bias::After => samples[hi - 1].value,
        };
    }

    // No sample equals the query, so `above` splits the profile strictly.
    let above = samples.partition_point(|s| s.t <= query_s);
    if above == samples.len() {
        return profile.last().value;
    }
    if above == 0 {
        return profile.first().value;
    }

    let Sample { t: t1, value: p1 } = samples[above - 1];
    let Sample { t: t2, value: p2 } = samples[above];
    p1 + (query_s - t1) / (t2 - t1) * (p2 - p1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 0.01;

    fn step_profile() -> Vec<Sample> {
        vec![
            Sample::new(0.0, 150.0),
            Sample::new(600.0, 150.0),
            Sample::new(600.0, 300.0),
            Sample::new(900.0, 300.0),
        ]
    }

    #[test]
    fn duplicate_timestamp_respects_bias() {
        let samples = step_profile();
        let profile = Profile::new(&samples).unwrap();
        assert_eq!(resolve(&profile, 600.0, Bias::Before, EPS), 150.0);
        assert_eq!(resolve(&profile, 600.0, Bias::After, EPS), 300.0);
    }

    #[test]
    fn band_absorbs_small_clock_noise() {
        let samples = step_profile();
        let profile = Profile::new(&samples).unwrap();
        assert_eq!(resolve(&profile, 600.005, Bias::Before, EPS), 150.0);
        assert_eq!(resolve(&profile, 599.995, Bias::After, EPS), 300.0);
    }

    #[test]
    fn band_edge_is_inclusive() {
        let samples = vec![Sample::new(0.0, 100.0), Sample::new(10.0, 200.0)];
        let profile = Profile::new(&samples).unwrap();
        assert_eq!(resolve(&profile, 9.75, Bias::After, 0.25), 200.0);
    }

    #[test]
    fn interpolates_between_distinct_samples() {
        let samples = vec![Sample::new(0.0, 100.0), Sample::new(100.0, 200.0)];
        let profile = Profile::new(&samples).unwrap();
        let mid = resolve(&profile, 25.0, Bias::After, EPS);
        assert!((mid - 125.0).abs() < 1e-9);
        assert_eq!(mid, resolve(&profile, 25.0, Bias::Before, EPS));
    }

    #[test]
    fn interpolation_skips_past_duplicate_run() {
        let samples = step_profile();
        let profile = Profile::new(&samples).unwrap();
        // Between the post-transition sample at 600s and 900s.
        let value = resolve(&profile, 750.0, Bias::Before, EPS);
        assert!((value - 300.0).abs() < 1e-9);
    }

    #[test]
    fn clamps_outside_profile_span() {
        let samples = vec![Sample::new(10.0, 120.0), Sample::new(20.0, 180.0)];
        let profile = Profile::new(&samples).unwrap();
        assert_eq!(resolve(&profile, 0.0, Bias::Before, EPS), 120.0);
        assert_eq!(resolve(&profile, 0.0, Bias::After, EPS), 120.0);
        assert_eq!(resolve(&profile, 500.0, Bias::Before, EPS), 180.0);
        assert_eq!(resolve(&profile, 500.0, Bias::After, EPS), 180.0);
    }

    #[test]
    fn single_sample_profile_always_clamps() {
        let samples = vec![Sample::new(30.0, 210.0)];
        let profile = Profile::new(&samples).unwrap();
        for query in [0.0, 29.0, 30.0, 31.0, 1e6] {
            assert_eq!(resolve(&profile, query, Bias::After, EPS), 210.0);
            assert_eq!(resolve(&profile, query, Bias::Before, EPS), 210.0);
        }
    }

    #[test]
    fn rejects_empty_and_unsorted_profiles() {
        assert_eq!(Profile::new(&[]).unwrap_err(), SyncError::EmptyProfile);
        let samples = vec![
            Sample::new(0.0, 1.0),
            Sample::new(5.0, 1.0),
            Sample::new(4.0, 1.0),
        ];
        assert_eq!(
            Profile::new(&samples).unwrap_err(),
            SyncError::NonMonotonicProfile {
                index: 2,
                prev_s: 5.0,
                next_s: 4.0
            }
        );
    }
}
