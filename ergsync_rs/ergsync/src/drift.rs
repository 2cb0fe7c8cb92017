use serde::{Deserialize, Serialize};

use crate::resolve::Profile;
use crate::{Sample, Segment};

/// Offset between a segment's end boundary and the nearest profile sample.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BoundaryDrift {
    pub segment: String,
    pub boundary_s: f64,
    pub sample_t: f64,
    pub sample_value: f64,
    /// `sample_t - boundary_s`; positive when the profile runs late.
    pub delta_s: f64,
}

/// Nearest sample to each cumulative segment end. Ties go to the earlier
/// sample.
pub fn boundary_drift(segments: &[Segment], profile: &Profile<'_>) -> Vec<BoundaryDrift> {
    let samples = profile.samples();
    let mut out = Vec::with_capacity(segments.len());
    let mut boundary = 0.0;
    for segment in segments {
        boundary += segment.duration_s;
        let nearest = nearest_sample(samples, boundary);
        out.push(BoundaryDrift {
            segment: segment.name.clone(),
            boundary_s: boundary,
            sample_t: nearest.t,
            sample_value: nearest.value,
            delta_s: nearest.t - boundary,
        });
    }
    out
}

/// Samples where the value differs from the previous sample, plus the first.
pub fn transitions(profile: &Profile<'_>) -> Vec<Sample> {
    let samples = profile.samples();
    let mut out = vec![samples[0]];
    for pair in samples.windows(2) {
        if pair[1].value != pair[0].value {
            out.push(pair[1]);
        }
    }
    out
}

fn nearest_sample(samples: &[Sample], t: f64) -> Sample {
    let idx = samples.partition_point(|s| s.t < t);
    if idx == 0 {
        return samples[0];
    }
    if idx == samples.len() {
        return samples[idx - 1];
    }
    // Step back to the first sample of a duplicate run.
    let mut before = idx - 1;
    while before > 0 && samples[before - 1].t == samples[before].t {
        before -= 1;
    }
    let after = samples[idx];
    if t - samples[before].t <= after.t - t {
        samples[before]
    } else {
        after
    }
}
