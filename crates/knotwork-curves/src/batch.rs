//! Independent calibrations in parallel.

use rayon::prelude::*;

use crate::bootstrap::{Bootstrapper, CalibratedCurve};
use crate::calibration::{CalibrationContext, CalibrationSet};
use crate::error::CurveResult;

/// Calibrates unrelated curves concurrently with one bootstrapper.
///
/// Results come back in input order; one failure does not stop the others.
/// A cancelled `context` cancels every calibration that has not finished.
pub fn calibrate_independent(
    bootstrapper: &Bootstrapper,
    sets: &[CalibrationSet],
    context: &CalibrationContext,
) -> Vec<CurveResult<CalibratedCurve>> {
    sets.par_iter()
        .map(|set| bootstrapper.calibrate(set, context))
        .collect()
}
