use serde::{Deserialize, Serialize};

use crate::zwo::ZwoStep;
use crate::{ReconciledInterval, SyncError};

/// Comparison of one reconciled interval with the matching planned step.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VerifyRow {
    pub index: usize,
    pub name: Option<String>,
    pub planned_watts: Option<i64>,
    pub planned_duration_s: Option<f64>,
    pub actual_watts: Option<i64>,
    pub actual_duration_s: Option<f64>,
    /// Reconciled as a ramp where the plan holds steady power.
    pub false_ramp: bool,
    pub power_ok: bool,
    pub duration_ok: bool,
}

impl VerifyRow {
    pub fn is_match(&self) -> bool {
        !self.false_ramp && self.power_ok && self.duration_ok
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VerifyReport {
    pub ftp: f64,
    pub rows: Vec<VerifyRow>,
}

impl VerifyReport {
    pub fn all_match(&self) -> bool {
        self.rows.iter().all(VerifyRow::is_match)
    }

    pub fn mismatches(&self) -> usize {
        self.rows.iter().filter(|r| !r.is_match()).count()
    }
}

/// Check reconciled intervals against the planned steps of a ZWO workout,
/// pairwise by position. Rows present on only one side never match.
pub fn verify(
    intervals: &[ReconciledInterval],
    plan: &[ZwoStep],
    ftp: f64,
    tolerance_w: f64,
) -> Result<VerifyReport, SyncError> {
    if !ftp.is_finite() || ftp <= 0.0 {
        return Err(SyncError::InvalidReference(ftp));
    }
    if !tolerance_w.is_finite() || tolerance_w < 0.0 {
        return Err(SyncError::InvalidParameter(format!(
            "power tolerance must be non-negative, got {}",
            tolerance_w
        )));
    }

    let count = intervals.len().max(plan.len());
    let mut rows = Vec::with_capacity(count);
    for index in 0..count {
        let actual = intervals.get(index);
        let planned = plan.get(index);
        let planned_watts = planned.map(|p| (p.average_fraction() * ftp).round() as i64);
        let actual_watts = actual.map(|a| a.average_value.round() as i64);

        let (false_ramp, power_ok, duration_ok) = match (actual, planned) {
            (Some(a), Some(p)) => {
                let false_ramp = p.is_steady() && !a.is_steady;
                let power_ok = match (actual_watts, planned_watts) {
                    (Some(aw), Some(pw)) => ((aw - pw) as f64).abs() <= tolerance_w,
                    _ => false,
                };
                let duration_ok = (a.duration_s - p.duration_s).abs() < 1e-6;
                (false_ramp, power_ok, duration_ok)
            }
            _ => (false, false, false),
        };

        rows.push(VerifyRow {
            index,
            name: actual.map(|a| a.name.clone()),
            planned_watts,
            planned_duration_s: planned.map(|p| p.duration_s),
            actual_watts,
            actual_duration_s: actual.map(|a| a.duration_s),
            false_ramp,
            power_ok,
            duration_ok,
        });
    }
    Ok(VerifyReport { ftp, rows })
}
