//! Repricing validation for calibrated curves.
//!
//! Every calibration ends with a [`RepricingReport`]: each instrument is
//! valued off the final curve and compared with its quote. On the raw
//! bootstrapped curve the errors sit at the solver tolerance; shape passes
//! may move interior points, and the report is where that shows.
//!
//! # Usage
//!
//! ```rust,ignore
//! use knotwork_curves::repricing::reprice;
//!
//! let report = reprice(&set, &curve, 1e-9)?;
//! if !report.is_valid() {
//!     eprintln!("Failed instruments: {:?}", report.failed_instruments());
//! }
//! ```

use std::fmt;

use crate::calibration::CalibrationSet;
use crate::error::CurveResult;
use crate::traits::{CalibrationInstrument, Curve};

/// Default absolute repricing tolerance.
pub const DEFAULT_REPRICING_TOLERANCE: f64 = 1e-9;

/// Result of repricing a single instrument against the curve.
#[derive(Debug, Clone, PartialEq)]
pub struct RepricingCheck {
    /// Position of the instrument in its calibration set.
    pub instrument_index: usize,

    /// Description of the instrument.
    pub description: String,

    /// The quote to match.
    pub target: f64,

    /// Model-implied quote from the curve.
    pub model: f64,

    /// Absolute error |model - target|
    pub error: f64,

    /// Tolerance applied.
    pub tolerance: f64,

    /// Whether this instrument passed validation.
    pub passed: bool,
}

impl RepricingCheck {
    /// Creates a new repricing check result.
    #[must_use]
    pub fn new(
        instrument_index: usize,
        description: String,
        target: f64,
        model: f64,
        tolerance: f64,
    ) -> Self {
        let error = (model - target).abs();
        let passed = error <= tolerance;

        Self {
            instrument_index,
            description,
            target,
            model,
            error,
            tolerance,
            passed,
        }
    }

    /// Values `instrument` off `curve` and compares with `target`.
    pub fn from_instrument(
        instrument_index: usize,
        instrument: &dyn CalibrationInstrument,
        target: f64,
        curve: &dyn Curve,
        tolerance: f64,
    ) -> CurveResult<Self> {
        let model = instrument.fair_value(curve)?;
        Ok(Self::new(
            instrument_index,
            instrument.description(),
            target,
            model,
            tolerance,
        ))
    }
}

impl fmt::Display for RepricingCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "✓" } else { "✗" };
        write!(
            f,
            "{} {} | Quote: {:.6e} | Model: {:.6e} | Error: {:.2e} (tol: {:.2e})",
            status, self.description, self.target, self.model, self.error, self.tolerance
        )
    }
}

/// Complete repricing report for a calibrated curve.
#[derive(Debug, Clone, PartialEq)]
pub struct RepricingReport {
    /// Individual instrument checks
    checks: Vec<RepricingCheck>,

    /// Maximum absolute error across all instruments
    max_error: f64,

    /// Root mean square of all errors
    rms_error: f64,

    /// Number of instruments that passed
    passed_count: usize,
}

impl RepricingReport {
    /// Creates a new repricing report from individual checks.
    #[must_use]
    pub fn new(checks: Vec<RepricingCheck>) -> Self {
        let max_error = checks.iter().map(|c| c.error).fold(0.0_f64, f64::max);

        let rms_error = if checks.is_empty() {
            0.0
        } else {
            let sum_sq: f64 = checks.iter().map(|c| c.error * c.error).sum();
            (sum_sq / checks.len() as f64).sqrt()
        };

        let passed_count = checks.iter().filter(|c| c.passed).count();

        Self {
            checks,
            max_error,
            rms_error,
            passed_count,
        }
    }

    /// Returns whether all instruments passed repricing validation.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.passed_count == self.checks.len()
    }

    /// Returns the individual repricing checks.
    #[must_use]
    pub fn checks(&self) -> &[RepricingCheck] {
        &self.checks
    }

    /// Returns the maximum absolute error.
    #[must_use]
    pub fn max_error(&self) -> f64 {
        self.max_error
    }

    /// Returns the RMS error.
    #[must_use]
    pub fn rms_error(&self) -> f64 {
        self.rms_error
    }

    /// Returns the number of instruments that passed.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.passed_count
    }

    /// Returns the number of instruments that failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.checks.len() - self.passed_count
    }

    /// Returns the total number of instruments checked.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.checks.len()
    }

    /// Returns failed instrument checks.
    #[must_use]
    pub fn failed_checks(&self) -> Vec<&RepricingCheck> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    /// Returns failed instrument descriptions.
    #[must_use]
    pub fn failed_instruments(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.description.as_str())
            .collect()
    }
}

impl fmt::Display for RepricingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Repricing Report")?;
        writeln!(f, "================")?;
        writeln!(f, "Status: {}", if self.is_valid() { "PASSED" } else { "FAILED" })?;
        writeln!(f, "Instruments: {}/{} passed", self.passed_count, self.checks.len())?;
        writeln!(f, "Max Error: {:.2e}", self.max_error)?;
        writeln!(f, "RMS Error: {:.2e}", self.rms_error)?;

        if !self.checks.is_empty() {
            writeln!(f)?;
            writeln!(f, "Details:")?;
            for check in &self.checks {
                writeln!(f, "  {check}")?;
            }
        }

        Ok(())
    }
}

/// Reprices every instrument of `set` at its quote off `curve`.
pub fn reprice(
    set: &CalibrationSet,
    curve: &dyn Curve,
    tolerance: f64,
) -> CurveResult<RepricingReport> {
    let checks = set
        .instruments()
        .iter()
        .zip(set.quotes())
        .enumerate()
        .map(|(index, (instrument, &quote))| {
            RepricingCheck::from_instrument(index, instrument.as_ref(), quote, curve, tolerance)
        })
        .collect::<CurveResult<Vec<_>>>()?;
    Ok(RepricingReport::new(checks))
}
