//! Sequential curve bootstrap.
//!
//! The bootstrapper grows a [`Regime`] one knot per instrument, in maturity
//! order. For each instrument the new node value is the only unknown: every
//! trial value refits the segment ending at the instrument's maturity (from
//! the state inherited at its left knot) and the root finder drives
//! `fair_value - quote` to zero. Earlier nodes and segments are never
//! revisited.
//!
//! # Example
//!
//! ```rust,ignore
//! use knotwork_curves::prelude::*;
//!
//! let set = CalibrationSet::new(vec![
//!     Arc::new(PointQuote::new(1.0, 0.010)?),
//!     Arc::new(PointQuote::new(2.0, 0.015)?),
//!     Arc::new(PointQuote::new(5.0, 0.020)?),
//! ])?;
//!
//! let bootstrapper = Bootstrapper::new(CalibrationConfig::default())?;
//! let curve = bootstrapper.calibrate(&set, &CalibrationContext::new())?;
//! assert!(curve.is_valid());
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use knotwork_math::solvers::{find_root, SolverConfig};
use knotwork_math::spline::SegmentFitter;
use knotwork_math::MathError;

use crate::calibration::{CalibrationContext, CalibrationSet};
use crate::config::{CalibrationConfig, Validate};
use crate::error::{CurveError, CurveResult};
use crate::regime::Regime;
use crate::repricing::{reprice, RepricingReport};
use crate::shape::ShapeController;

/// Solver outcome for one instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepDiagnostics {
    /// Position of the instrument in its calibration set.
    pub instrument_index: usize,
    /// Knot added for it.
    pub maturity: f64,
    /// Solved node value.
    pub node: f64,
    /// Root finder iterations.
    pub iterations: u32,
    /// Final residual `fair_value - quote`.
    pub residual: f64,
}

/// A calibrated curve with its audit trail.
#[derive(Debug, Clone)]
pub struct CalibratedCurve {
    regime: Regime,
    raw: Regime,
    set: CalibrationSet,
    report: RepricingReport,
    steps: Vec<StepDiagnostics>,
    build_duration: Duration,
}

impl CalibratedCurve {
    /// The final (shaped, if configured) regime.
    #[must_use]
    pub fn regime(&self) -> &Regime {
        &self.regime
    }

    /// The regime straight out of the bootstrap, before shape passes.
    #[must_use]
    pub fn raw_regime(&self) -> &Regime {
        &self.raw
    }

    /// Instruments and quotes the curve was calibrated to.
    #[must_use]
    pub fn calibration_set(&self) -> &CalibrationSet {
        &self.set
    }

    /// Repricing report of the final regime.
    #[must_use]
    pub fn report(&self) -> &RepricingReport {
        &self.report
    }

    /// Per-instrument solver diagnostics for the instruments solved in this
    /// run (a restart from a prefix only lists the re-solved ones).
    #[must_use]
    pub fn steps(&self) -> &[StepDiagnostics] {
        &self.steps
    }

    /// Wall time of the calibration.
    #[must_use]
    pub fn build_duration(&self) -> Duration {
        self.build_duration
    }

    /// True if every instrument reprices within tolerance.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.report.is_valid()
    }

    /// Consumes the result and returns the final regime.
    #[must_use]
    pub fn into_regime(self) -> Regime {
        self.regime
    }
}

/// Sequential bootstrapper.
#[derive(Debug, Clone)]
pub struct Bootstrapper {
    config: CalibrationConfig,
    fitter: Arc<SegmentFitter>,
    solver: SolverConfig,
    shape: ShapeController,
}

impl Bootstrapper {
    /// Validates `config` and builds the shared segment fitter.
    pub fn new(config: CalibrationConfig) -> CurveResult<Self> {
        config.validate_or_error()?;
        let fitter = Arc::new(config.segment.fitter()?);
        let solver = config.solver.solver_config();
        let shape = ShapeController::new(config.shape)?;
        Ok(Self {
            config,
            fitter,
            solver,
            shape,
        })
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// The shared segment fitter.
    #[must_use]
    pub fn fitter(&self) -> &Arc<SegmentFitter> {
        &self.fitter
    }

    /// Calibrates a curve to every instrument of `set`.
    ///
    /// # Errors
    ///
    /// - [`CurveError::InstrumentOrderingViolation`] if the first maturity is
    ///   not after the anchor
    /// - [`CurveError::RootNotBracketed`] if no node value in the bracket
    ///   reprices an instrument
    /// - [`CurveError::BootstrapNonConvergence`] if the root finder runs out
    ///   of iterations
    /// - [`CurveError::UnderdeterminedSegment`] or
    ///   [`CurveError::IllConditionedSegment`] from the segment fitter
    /// - [`CurveError::ShapeConstraintConflict`] from the shape passes
    /// - [`CurveError::Cancelled`] if `context` cancels the run
    pub fn calibrate(
        &self,
        set: &CalibrationSet,
        context: &CalibrationContext,
    ) -> CurveResult<CalibratedCurve> {
        let started = Instant::now();
        self.check_set(set)?;
        let working = match self.config.anchor {
            Some(anchor) => Regime::anchored(
                Arc::clone(&self.fitter),
                self.config.extrapolation,
                anchor.knot,
                anchor.value,
            )?,
            None => Regime::empty(Arc::clone(&self.fitter), self.config.extrapolation),
        };
        self.run(set, working, 0, context, started)
    }

    /// Re-solves instruments `first..` of `set`, reusing the knots and
    /// segments of `previous` before instrument `first`.
    ///
    /// `previous` must be a raw regime built by this bootstrapper from a set
    /// with the same maturities.
    pub(crate) fn calibrate_from(
        &self,
        set: &CalibrationSet,
        previous: &Regime,
        first: usize,
        context: &CalibrationContext,
    ) -> CurveResult<CalibratedCurve> {
        let started = Instant::now();
        self.check_set(set)?;
        let anchors = usize::from(self.config.anchor.is_some());
        if previous.len() != set.len() + anchors || first > set.len() {
            return Err(CurveError::invalid_input(format!(
                "cannot restart at instrument {first}: previous curve has {} knots for {} instruments",
                previous.len(),
                set.len()
            )));
        }
        let working = previous.truncated(anchors + first);
        self.run(set, working, first, context, started)
    }

    fn check_set(&self, set: &CalibrationSet) -> CurveResult<()> {
        let maturities = set.maturities();
        let mut knots = Vec::with_capacity(maturities.len() + 1);
        if let Some(anchor) = self.config.anchor {
            if let Some(&first) = maturities.first() {
                if first <= anchor.knot {
                    return Err(CurveError::InstrumentOrderingViolation {
                        index: 0,
                        maturity: first,
                        previous: anchor.knot,
                    });
                }
            }
            knots.push(anchor.knot);
        }
        knots.extend(maturities);

        for (index, constraint) in self.fitter.constraint_set().constraints().iter().enumerate() {
            if !knots.windows(2).any(|w| constraint.applies_to(w[0], w[1])) {
                let (lo, hi) = constraint.span();
                return Err(CurveError::invalid_input(format!(
                    "response constraint {index} on [{lo}, {hi}] does not lie inside a single segment"
                )));
            }
            if let Some(knot) = knots.iter().find(|&&k| constraint.pinned_value_at(k).is_some()) {
                return Err(CurveError::invalid_input(format!(
                    "response constraint {index} pins the value at knot {knot}, which its instrument already sets"
                )));
            }
        }
        Ok(())
    }

    fn run(
        &self,
        set: &CalibrationSet,
        mut working: Regime,
        first: usize,
        context: &CalibrationContext,
        started: Instant,
    ) -> CurveResult<CalibratedCurve> {
        let mut steps = Vec::with_capacity(set.len() - first);
        for index in first..set.len() {
            if context.is_cancelled() {
                tracing::warn!(instrument_index = index, "calibration cancelled");
                return Err(CurveError::Cancelled {
                    instrument_index: index,
                    calibrated_prefix: working.node_pairs(),
                });
            }
            steps.push(self.solve_node(set, index, &mut working)?);
        }
        self.finish(set, working, steps, started)
    }

    fn solve_node(
        &self,
        set: &CalibrationSet,
        index: usize,
        working: &mut Regime,
    ) -> CurveResult<StepDiagnostics> {
        let instrument = &set.instruments()[index];
        let quote = set.quotes()[index];
        let maturity = instrument.maturity();
        let bracket = self.config.solver.bracket;
        let guess = working
            .nodes()
            .last()
            .copied()
            .filter(|&g| bracket.contains(g));

        let outcome = {
            let objective = |node: f64| -> CurveResult<f64> {
                working.push_node(maturity, node)?;
                let value = instrument.fair_value(&*working);
                working.pop_node();
                Ok(value? - quote)
            };
            find_root(self.config.solver.method, objective, bracket, guess, &self.solver)
        };

        let solved = match outcome {
            Ok(solved) => solved,
            Err(err) => {
                let err = Self::step_error(err, index, set, working);
                tracing::warn!(instrument_index = index, error = %err, "calibration step failed");
                return Err(err);
            }
        };

        working.push_node(maturity, solved.root)?;
        tracing::debug!(
            instrument_index = index,
            maturity,
            node = solved.root,
            iterations = solved.iterations,
            residual = solved.residual,
            "calibrated node"
        );

        Ok(StepDiagnostics {
            instrument_index: index,
            maturity,
            node: solved.root,
            iterations: solved.iterations,
            residual: solved.residual,
        })
    }

    /// Attaches instrument context to a root finder failure.
    fn step_error(
        err: CurveError,
        index: usize,
        set: &CalibrationSet,
        working: &Regime,
    ) -> CurveError {
        let instrument = set.instruments()[index].description();
        match err {
            CurveError::Math(MathError::InvalidBracket { a, b, fa, fb }) => {
                CurveError::RootNotBracketed {
                    instrument_index: index,
                    instrument,
                    lower: a,
                    upper: b,
                    residual_lower: fa,
                    residual_upper: fb,
                }
            }
            CurveError::Math(MathError::ConvergenceFailed {
                iterations,
                residual,
            }) => CurveError::BootstrapNonConvergence {
                instrument_index: index,
                instrument,
                iterations,
                residual,
                calibrated_prefix: working.node_pairs(),
            },
            other => other,
        }
    }

    fn finish(
        &self,
        set: &CalibrationSet,
        raw: Regime,
        steps: Vec<StepDiagnostics>,
        started: Instant,
    ) -> CurveResult<CalibratedCurve> {
        let regime = if self.shape.settings().is_active() {
            self.shape.apply(&raw)?
        } else {
            raw.clone()
        };

        let report = reprice(set, &regime, self.config.repricing_tolerance)?;
        if !report.is_valid() {
            tracing::warn!(
                failed = report.failed_count(),
                max_error = report.max_error(),
                "calibrated curve misses repricing tolerance"
            );
        }

        let build_duration = started.elapsed();
        tracing::info!(
            instruments = set.len(),
            solved = steps.len(),
            max_error = report.max_error(),
            elapsed_us = build_duration.as_micros() as u64,
            "calibration complete"
        );

        Ok(CalibratedCurve {
            regime,
            raw,
            set: set.clone(),
            report,
            steps,
            build_duration,
        })
    }
}
