use serde::{Deserialize, Serialize};

use crate::resolve::{resolve, Bias, Profile};
use crate::zone::{classify, Zone};
use crate::{Params, ReconciledInterval, Sample, Segment, SyncError};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSummary {
    pub intervals: usize,
    pub total_duration_s: f64,
    pub steady_count: usize,
    pub ramp_count: usize,
    /// Duration-weighted mean of the interval averages.
    pub average_value: Option<f64>,
}

/// Walk the segments in order and read each one's start/end value from the
/// profile. Starts read the value after any transition at that instant, ends
/// the value before it.
pub fn reconcile(
    segments: &[Segment],
    samples: &[Sample],
    params: &Params,
) -> Result<Vec<ReconciledInterval>, SyncError> {
    let profile = validate_inputs(segments, samples, params)?;

    let mut out = Vec::with_capacity(segments.len());
    let mut cursor = 0.0;
    for segment in segments {
        let interval = reconcile_segment(segment, cursor, &profile, params)?;
        cursor = interval.end_s;
        out.push(interval);
    }
    Ok(out)
}

/// Same result as [`reconcile`], with boundary lookups spread over the rayon
/// pool. Start times come from the same sequential prefix sum.
#[cfg(feature = "parallel")]
pub fn reconcile_parallel(
    segments: &[Segment],
    samples: &[Sample],
    params: &Params,
) -> Result<Vec<ReconciledInterval>, SyncError> {
    use rayon::prelude::*;

    let profile = validate_inputs(segments, samples, params)?;
    let starts = start_cursors(segments);
    segments
        .par_iter()
        .zip(starts.par_iter())
        .map(|(segment, &start)| reconcile_segment(segment, start, &profile, params))
        .collect()
}

pub fn summarize(intervals: &[ReconciledInterval]) -> WorkoutSummary {
    let total_duration_s: f64 = intervals.iter().map(|i| i.duration_s).sum();
    let steady_count = intervals.iter().filter(|i| i.is_steady).count();
    let average_value = if total_duration_s > 0.0 {
        let weighted: f64 = intervals
            .iter()
            .map(|i| i.average_value * i.duration_s)
            .sum();
        Some(weighted / total_duration_s)
    } else {
        None
    };
    WorkoutSummary {
        intervals: intervals.len(),
        total_duration_s,
        steady_count,
        ramp_count: intervals.len() - steady_count,
        average_value,
    }
}

fn validate_inputs<'a>(
    segments: &[Segment],
    samples: &'a [Sample],
    params: &Params,
) -> Result<Profile<'a>, SyncError> {
    params.validate()?;
    let profile = Profile::new(samples)?;
    for (index, segment) in segments.iter().enumerate() {
        if !(segment.duration_s > 0.0) || !segment.duration_s.is_finite() {
            return Err(SyncError::ZeroOrNegativeDuration {
                index,
                name: segment.name.clone(),
                duration_s: segment.duration_s,
            });
        }
    }
    Ok(profile)
}

#[cfg(feature = "parallel")]
fn start_cursors(segments: &[Segment]) -> Vec<f64> {
    let mut starts = Vec::with_capacity(segments.len());
    let mut cursor = 0.0;
    for segment in segments {
        starts.push(cursor);
        cursor += segment.duration_s;
    }
    starts
}

fn reconcile_segment(
    segment: &Segment,
    start_s: f64,
    profile: &Profile<'_>,
    params: &Params,
) -> Result<ReconciledInterval, SyncError> {
    let end_s = start_s + segment.duration_s;
    let start_value = resolve(profile, start_s, Bias::After, params.match_epsilon_s);
    let end_value = resolve(profile, end_s, Bias::Before, params.match_epsilon_s);
    let average_value = (start_value + end_value) / 2.0;
    let zone = match params.reference {
        Some(reference) => classify(Some(average_value), reference)?,
        None => Zone::Unknown,
    };
    Ok(ReconciledInterval {
        name: segment.name.clone(),
        start_s,
        end_s,
        duration_s: segment.duration_s,
        start_value,
        end_value,
        average_value,
        is_steady: is_steady(start_value, end_value, params.steady_threshold),
        zone,
    })
}

/// A non-positive start has no meaningful percentage change and counts as steady.
pub(crate) fn is_steady(start_value: f64, end_value: f64, threshold: f64) -> bool {
    if start_value > 0.0 {
        (end_value - start_value).abs() / start_value < threshold
    } else {
        true
    }
}
