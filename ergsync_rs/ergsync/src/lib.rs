//! Reconcile structured workout steps with a separately sampled power profile.
//!
//! A TCX workout knows the names and durations of its steps; an ERG course
//! knows the watts but not the names. The two are exported by different
//! serializers and their clocks disagree by fractions of a second. This crate
//! walks the step timeline, reads the power profile at each boundary with an
//! explicit before/after bias, and produces one [`ReconciledInterval`] per step.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod drift;
pub mod erg;
pub mod pbintervals;
pub mod reconcile;
pub mod resolve;
pub mod tcx;
pub mod verify;
pub mod zone;
pub mod zwo;

pub use drift::{boundary_drift, transitions, BoundaryDrift};
pub use erg::{parse_erg, ErgFile, ErgHeader};
pub use pbintervals::{default_output_path, format_call_name, seconds_to_hhmmss, write_pbintervals};
#[cfg(feature = "parallel")]
pub use reconcile::reconcile_parallel;
pub use reconcile::{reconcile, summarize, WorkoutSummary};
pub use resolve::{resolve, Bias, Profile};
pub use tcx::{parse_tcx, Workout};
pub use verify::{verify, VerifyReport, VerifyRow};
pub use zone::{classify, Zone};
pub use zwo::{parse_zwo, ZwoStep, ZwoWorkout};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("power profile has no samples")]
    EmptyProfile,
    #[error("power profile is not sorted by time: sample {index} at {next_s}s follows {prev_s}s")]
    NonMonotonicProfile { index: usize, prev_s: f64, next_s: f64 },
    #[error("segment {index} ('{name}') has non-positive duration {duration_s}s")]
    ZeroOrNegativeDuration {
        index: usize,
        name: String,
        duration_s: f64,
    },
    #[error("zone reference must be positive, got {0}")]
    InvalidReference(f64),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("failed to parse ERG file: {0}")]
    ErgParse(String),
    #[error("failed to parse TCX file: {0}")]
    TcxParse(String),
    #[error("failed to parse ZWO file: {0}")]
    ZwoParse(String),
    #[error("failed to write export: {0}")]
    Export(String),
}

/// One observation of the power profile.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub t: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(t: f64, value: f64) -> Self {
        Self { t, value }
    }
}

/// A named step of the structural timeline. Position comes only from the
/// cumulative duration of the steps before it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub name: String,
    pub duration_s: f64,
}

impl Segment {
    pub fn new(name: impl Into<String>, duration_s: f64) -> Self {
        Self {
            name: name.into(),
            duration_s,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReconciledInterval {
    pub name: String,
    pub start_s: f64,
    pub end_s: f64,
    pub duration_s: f64,
    pub start_value: f64,
    pub end_value: f64,
    pub average_value: f64,
    pub is_steady: bool,
    pub zone: Zone,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Params {
    /// Relative start/end change below which an interval counts as steady.
    pub steady_threshold: f64,
    /// Half-width of the exact-time band, in seconds.
    pub match_epsilon_s: f64,
    /// Zone normalization constant (FTP watts). `None` leaves zones unknown.
    pub reference: Option<f64>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            steady_threshold: 0.10,
            match_epsilon_s: 0.01,
            reference: None,
        }
    }
}

impl Params {
    pub fn with_reference(reference: f64) -> Self {
        Self {
            reference: Some(reference),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), SyncError> {
        if !self.steady_threshold.is_finite() || self.steady_threshold < 0.0 {
            return Err(SyncError::InvalidParameter(format!(
                "steady_threshold must be a non-negative number, got {}",
                self.steady_threshold
            )));
        }
        if !self.match_epsilon_s.is_finite() || self.match_epsilon_s < 0.0 {
            return Err(SyncError::InvalidParameter(format!(
                "match_epsilon_s must be a non-negative number, got {}",
                self.match_epsilon_s
            )));
        }
        if let Some(reference) = self.reference {
            zone::validate_reference(reference)?;
        }
        Ok(())
    }
}
