//! Shifts and tweaks of a calibrated curve.
//!
//! A [`LatentStateView`] reads a [`CalibratedCurve`] and produces new
//! [`Regime`] values; neither the curve nor the bootstrapper is touched.
//!
//! Two families of operation:
//!
//! - **Manifest measure** shifts move instrument quotes and re-run the
//!   bootstrap, from the first shifted instrument on.
//! - **Quantification metric** shifts move the calibrated node values
//!   directly and refit the segment chain without any root finding.

use knotwork_math::guard::{ensure_all_finite, ensure_finite};
use serde::{Deserialize, Serialize};

use crate::bootstrap::{Bootstrapper, CalibratedCurve};
use crate::calibration::CalibrationContext;
use crate::error::{CurveError, CurveResult};
use crate::regime::Regime;

/// How [`TweakSpec::amount`] is applied to a base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TweakMode {
    /// `base + weight * amount`
    #[default]
    Absolute,
    /// `base + weight * amount * base`
    Proportional,
}

/// Per-entry weights of a tweak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TweakWeights {
    /// Weight 1 everywhere.
    Uniform,
    /// Weight 1 at one entry, 0 elsewhere.
    Single(usize),
    /// Explicit weight per entry.
    PerNode(Vec<f64>),
}

/// A named, weighted shift of quotes or node values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTweakSpec")]
pub struct TweakSpec {
    name: String,
    mode: TweakMode,
    amount: f64,
    weights: TweakWeights,
}

#[derive(Deserialize)]
struct RawTweakSpec {
    name: String,
    #[serde(default)]
    mode: TweakMode,
    amount: f64,
    weights: TweakWeights,
}

impl TryFrom<RawTweakSpec> for TweakSpec {
    type Error = CurveError;

    fn try_from(raw: RawTweakSpec) -> CurveResult<Self> {
        Self::new(raw.name, raw.mode, raw.amount, raw.weights)
    }
}

impl TweakSpec {
    /// Creates a tweak.
    pub fn new(
        name: impl Into<String>,
        mode: TweakMode,
        amount: f64,
        weights: TweakWeights,
    ) -> CurveResult<Self> {
        let amount = ensure_finite("tweak amount", amount)?;
        if let TweakWeights::PerNode(w) = &weights {
            ensure_all_finite("tweak weights", w)?;
        }
        Ok(Self {
            name: name.into(),
            mode,
            amount,
            weights,
        })
    }

    /// Uniform absolute shift.
    pub fn parallel(amount: f64) -> CurveResult<Self> {
        Self::new("parallel", TweakMode::Absolute, amount, TweakWeights::Uniform)
    }

    /// Absolute shift of a single entry.
    pub fn single_node(index: usize, amount: f64) -> CurveResult<Self> {
        Self::new(
            format!("node {index}"),
            TweakMode::Absolute,
            amount,
            TweakWeights::Single(index),
        )
    }

    /// Name of the tweak.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Application mode.
    #[must_use]
    pub fn mode(&self) -> TweakMode {
        self.mode
    }

    /// Shift amount.
    #[must_use]
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Weights.
    #[must_use]
    pub fn weights(&self) -> &TweakWeights {
        &self.weights
    }

    /// Shift of every entry of `base`.
    pub fn shifts(&self, base: &[f64]) -> CurveResult<Vec<f64>> {
        let weights = match &self.weights {
            TweakWeights::Uniform => vec![1.0; base.len()],
            TweakWeights::Single(index) => {
                if *index >= base.len() {
                    return Err(CurveError::invalid_input(format!(
                        "tweak '{}' targets entry {index} of {}",
                        self.name,
                        base.len()
                    )));
                }
                let mut w = vec![0.0; base.len()];
                w[*index] = 1.0;
                w
            }
            TweakWeights::PerNode(w) => {
                if w.len() != base.len() {
                    return Err(CurveError::invalid_input(format!(
                        "tweak '{}' has {} weights for {} entries",
                        self.name,
                        w.len(),
                        base.len()
                    )));
                }
                w.clone()
            }
        };

        Ok(base
            .iter()
            .zip(weights)
            .map(|(&b, w)| match self.mode {
                TweakMode::Absolute => w * self.amount,
                TweakMode::Proportional => w * self.amount * b,
            })
            .collect())
    }

    /// `base` with the tweak applied.
    pub fn apply(&self, base: &[f64]) -> CurveResult<Vec<f64>> {
        Ok(base
            .iter()
            .zip(self.shifts(base)?)
            .map(|(b, s)| b + s)
            .collect())
    }
}

/// Read-only view of a calibrated curve for sensitivity runs.
///
/// The view must be given the bootstrapper that produced the curve.
///
/// # Locality
///
/// Moving the quote that owns knot `k` re-solves only knots `k..`, so the
/// raw curve left of knot `k - 1` is untouched. Shape passes then run over
/// the whole re-solved curve, and their knot slopes read the secants on both
/// sides of a knot:
///
/// - the monotone filter and the Bessel, harmonic, Van Leer and Kruger
///   generators also rebuild the segment ending at knot `k - 1`, so the
///   shaped curve is only fixed up to knot `k - 2`
/// - Akima's wider stencil reaches one knot further, up to knot `k - 3`
/// - slopes damped for a non-cubic basis, and extrema elimination, can
///   pass a change on to further neighbours
#[derive(Debug, Clone)]
pub struct LatentStateView<'a> {
    bootstrapper: &'a Bootstrapper,
    curve: &'a CalibratedCurve,
    context: CalibrationContext,
}

impl<'a> LatentStateView<'a> {
    /// Creates a view.
    #[must_use]
    pub fn new(bootstrapper: &'a Bootstrapper, curve: &'a CalibratedCurve) -> Self {
        Self {
            bootstrapper,
            curve,
            context: CalibrationContext::new(),
        }
    }

    /// Uses `context` for re-calibrations.
    #[must_use]
    pub fn with_context(mut self, context: CalibrationContext) -> Self {
        self.context = context;
        self
    }

    /// The underlying calibrated curve.
    #[must_use]
    pub fn curve(&self) -> &CalibratedCurve {
        self.curve
    }

    /// Quotes the view is anchored to.
    #[must_use]
    pub fn manifest_measures(&self) -> &[f64] {
        self.curve.calibration_set().quotes()
    }

    /// Re-calibrates with every quote moved by `delta`.
    pub fn parallel_shift_manifest_measure(&self, delta: f64) -> CurveResult<Regime> {
        let delta = ensure_finite("shift", delta)?;
        let quotes = self.manifest_measures().iter().map(|q| q + delta).collect();
        self.recalibrate_from(quotes, 0)
    }

    /// Re-calibrates with quote `index` moved by `delta`.
    ///
    /// Knots and segments left of the instrument's segment are reused as is.
    pub fn shift_manifest_measure(&self, index: usize, delta: f64) -> CurveResult<Regime> {
        let delta = ensure_finite("shift", delta)?;
        let mut quotes = self.manifest_measures().to_vec();
        let Some(quote) = quotes.get_mut(index) else {
            return Err(CurveError::invalid_input(format!(
                "instrument index {index} out of range for {} instruments",
                self.manifest_measures().len()
            )));
        };
        *quote += delta;
        self.recalibrate_from(quotes, index)
    }

    /// Re-calibrates with `tweak` applied to the quotes, from the first
    /// instrument it moves.
    pub fn custom_tweak_manifest_measure(&self, tweak: &TweakSpec) -> CurveResult<Regime> {
        let base = self.manifest_measures();
        let shifts = tweak.shifts(base)?;
        let Some(first) = shifts.iter().position(|&s| s != 0.0) else {
            return Ok(self.curve.regime().clone());
        };
        let quotes = base.iter().zip(&shifts).map(|(q, s)| q + s).collect();
        self.recalibrate_from(quotes, first)
    }

    /// Moves every instrument node by `delta` and refits.
    pub fn parallel_shift_quantification_metric(&self, delta: f64) -> CurveResult<Regime> {
        let delta = ensure_finite("shift", delta)?;
        self.shift_nodes(|nodes| Ok(nodes.iter().map(|n| n + delta).collect()))
    }

    /// Applies `tweak` to the instrument nodes and refits.
    pub fn custom_tweak_quantification_metric(&self, tweak: &TweakSpec) -> CurveResult<Regime> {
        self.shift_nodes(|nodes| tweak.apply(nodes))
    }

    fn recalibrate_from(&self, quotes: Vec<f64>, first: usize) -> CurveResult<Regime> {
        let set = self.curve.calibration_set().requoted(quotes)?;
        let curve =
            self.bootstrapper
                .calibrate_from(&set, self.curve.raw_regime(), first, &self.context)?;
        Ok(curve.into_regime())
    }

    /// Rewrites the instrument nodes; an anchor node stays fixed.
    fn shift_nodes<F>(&self, shift: F) -> CurveResult<Regime>
    where
        F: FnOnce(&[f64]) -> CurveResult<Vec<f64>>,
    {
        let regime = self.curve.regime();
        let anchors = regime.len() - self.curve.calibration_set().len();
        let (fixed, moved) = regime.nodes().split_at(anchors);
        let mut nodes = fixed.to_vec();
        nodes.extend(shift(moved)?);
        regime.with_nodes(&nodes)
    }
}
