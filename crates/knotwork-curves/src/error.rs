//! Error types for curve calibration.
//!
//! Every failure carries the index of the instrument or segment it arose
//! from. [`CurveError::category`] groups the variants by who can act on
//! them: the caller (bad inputs), the numerics, the configuration, the shape
//! policy, or a cancellation.

use knotwork_math::MathError;
use thiserror::Error;

/// A specialized Result type for curve operations.
pub type CurveResult<T> = Result<T, CurveError>;

/// Error types for curve operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CurveError {
    /// A non-finite value, empty input or inconsistent setting.
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Description of the problem.
        reason: String,
    },

    /// Instrument maturities are duplicated or out of order.
    #[error(
        "Instrument {index} matures at {maturity:.6}, not after the previous knot at {previous:.6}"
    )]
    InstrumentOrderingViolation {
        /// Index of the offending instrument.
        index: usize,
        /// Its maturity.
        maturity: f64,
        /// Knot it must lie strictly after.
        previous: f64,
    },

    /// Segment constraints plus penalty leave coefficients undetermined.
    #[error(
        "Segment {segment_index} is under-determined: {independent} independent conditions for {unknowns} coefficients"
    )]
    UnderdeterminedSegment {
        /// Index of the segment.
        segment_index: usize,
        /// Independent conditions found.
        independent: usize,
        /// Basis size.
        unknowns: usize,
    },

    /// Segment system is singular or beyond the condition cap.
    #[error("Segment {segment_index} is ill-conditioned (condition number {condition_number:.2e})")]
    IllConditionedSegment {
        /// Index of the segment.
        segment_index: usize,
        /// Condition number estimate.
        condition_number: f64,
    },

    /// The repricing residual has the same sign at both bracket ends.
    #[error(
        "Instrument {instrument_index} ({instrument}) not bracketed on [{lower}, {upper}]: residuals {residual_lower:.3e} and {residual_upper:.3e}"
    )]
    RootNotBracketed {
        /// Index of the instrument.
        instrument_index: usize,
        /// Instrument description.
        instrument: String,
        /// Bracket lower bound.
        lower: f64,
        /// Bracket upper bound.
        upper: f64,
        /// Residual at the lower bound.
        residual_lower: f64,
        /// Residual at the upper bound.
        residual_upper: f64,
    },

    /// The root finder ran out of iterations.
    #[error(
        "Bootstrap did not converge at instrument {instrument_index} ({instrument}) after {iterations} iterations (residual {residual:.3e})"
    )]
    BootstrapNonConvergence {
        /// Index of the instrument.
        instrument_index: usize,
        /// Instrument description.
        instrument: String,
        /// Iterations performed.
        iterations: u32,
        /// Last residual.
        residual: f64,
        /// `(knot, node)` pairs fixed before the failure, for diagnostics.
        calibrated_prefix: Vec<(f64, f64)>,
    },

    /// A shape pass cannot act without breaking continuity or a constraint.
    #[error("Shape control conflict on segment {segment_index}: {reason}")]
    ShapeConstraintConflict {
        /// Index of the segment.
        segment_index: usize,
        /// What would have been violated.
        reason: String,
    },

    /// The calibration was cancelled or ran past its deadline.
    #[error("Calibration cancelled before instrument {instrument_index}")]
    Cancelled {
        /// Instrument that was about to be calibrated.
        instrument_index: usize,
        /// `(knot, node)` pairs fixed before cancellation.
        calibrated_prefix: Vec<(f64, f64)>,
    },

    /// Evaluation outside the knot range with extrapolation disabled.
    #[error("Point {x:.6} outside curve domain [{min:.6}, {max:.6}]")]
    OutOfDomain {
        /// Requested abscissa.
        x: f64,
        /// First knot.
        min: f64,
        /// Last knot.
        max: f64,
    },

    /// Numerical error outside a calibration step.
    #[error("Math error: {0}")]
    Math(#[source] MathError),
}

impl From<MathError> for CurveError {
    /// Guard failures become [`CurveError::InvalidInput`]; everything else is
    /// wrapped.
    fn from(err: MathError) -> Self {
        match err {
            MathError::InvalidInput { reason } => Self::InvalidInput { reason },
            other => Self::Math(other),
        }
    }
}

/// Who can act on a [`CurveError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad inputs; fix and retry.
    CallerFixable,
    /// Numerical breakdown; a different method or bracket may help.
    Numerical,
    /// Basis, continuity and penalty settings do not fit together.
    Configuration,
    /// Shape passes collided with continuity or constraints.
    ShapePolicy,
    /// Cancelled by the caller.
    Cancelled,
}

impl CurveError {
    /// Creates an invalid input error.
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Creates a shape conflict error.
    #[must_use]
    pub fn shape_conflict(segment_index: usize, reason: impl Into<String>) -> Self {
        Self::ShapeConstraintConflict {
            segment_index,
            reason: reason.into(),
        }
    }

    /// Attaches a segment index to a fitter failure.
    #[must_use]
    pub fn from_segment_fit(segment_index: usize, err: MathError) -> Self {
        match err {
            MathError::Underdetermined {
                independent,
                unknowns,
            } => Self::UnderdeterminedSegment {
                segment_index,
                independent,
                unknowns,
            },
            MathError::IllConditioned { condition_number } => Self::IllConditionedSegment {
                segment_index,
                condition_number,
            },
            MathError::InvalidInput { reason } => Self::InvalidInput {
                reason: format!("segment {segment_index}: {reason}"),
            },
            other => Self::Math(other),
        }
    }

    /// Category of the error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput { .. }
            | Self::InstrumentOrderingViolation { .. }
            | Self::RootNotBracketed { .. }
            | Self::OutOfDomain { .. } => ErrorCategory::CallerFixable,
            Self::IllConditionedSegment { .. }
            | Self::BootstrapNonConvergence { .. }
            | Self::Math(_) => ErrorCategory::Numerical,
            Self::UnderdeterminedSegment { .. } => ErrorCategory::Configuration,
            Self::ShapeConstraintConflict { .. } => ErrorCategory::ShapePolicy,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
        }
    }

    /// Instrument index, for instrument-level failures.
    #[must_use]
    pub fn instrument_index(&self) -> Option<usize> {
        match self {
            Self::InstrumentOrderingViolation { index, .. } => Some(*index),
            Self::RootNotBracketed {
                instrument_index, ..
            }
            | Self::BootstrapNonConvergence {
                instrument_index, ..
            }
            | Self::Cancelled {
                instrument_index, ..
            } => Some(*instrument_index),
            _ => None,
        }
    }

    /// Segment index, for segment-level failures.
    #[must_use]
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            Self::UnderdeterminedSegment { segment_index, .. }
            | Self::IllConditionedSegment { segment_index, .. }
            | Self::ShapeConstraintConflict { segment_index, .. } => Some(*segment_index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_fit_mapping() {
        let err = CurveError::from_segment_fit(
            3,
            MathError::Underdetermined {
                independent: 2,
                unknowns: 4,
            },
        );
        assert_eq!(err.segment_index(), Some(3));
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = CurveError::from_segment_fit(1, MathError::ill_conditioned(1e15));
        assert!(matches!(
            err,
            CurveError::IllConditionedSegment {
                segment_index: 1,
                ..
            }
        ));
        assert_eq!(err.category(), ErrorCategory::Numerical);
    }

    #[test]
    fn test_categories() {
        let err = CurveError::InstrumentOrderingViolation {
            index: 2,
            maturity: 1.0,
            previous: 1.0,
        };
        assert_eq!(err.category(), ErrorCategory::CallerFixable);
        assert_eq!(err.instrument_index(), Some(2));

        let err = CurveError::Cancelled {
            instrument_index: 0,
            calibrated_prefix: vec![],
        };
        assert_eq!(err.category(), ErrorCategory::Cancelled);
        assert_eq!(
            CurveError::shape_conflict(0, "C2").category(),
            ErrorCategory::ShapePolicy
        );
    }

    #[test]
    fn test_guard_failures_are_caller_fixable() {
        let err: CurveError = MathError::invalid_input("x must be finite").into();
        assert_eq!(err.category(), ErrorCategory::CallerFixable);

        let err: CurveError = MathError::convergence_failed(10, 1e-3).into();
        assert!(matches!(err, CurveError::Math(_)));
    }

    #[test]
    fn test_display_mentions_instrument() {
        let err = CurveError::RootNotBracketed {
            instrument_index: 1,
            instrument: "Point 2Y".to_string(),
            lower: -1.0,
            upper: 1.0,
            residual_lower: -1e6,
            residual_upper: -1e6,
        };
        assert!(err.to_string().contains("Point 2Y"));
    }
}
