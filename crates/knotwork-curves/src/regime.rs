//! Piecewise curve regimes.
//!
//! A [`Regime`] is an ordered chain of fitted segments over strictly
//! increasing knots. The bootstrapper grows one knot at a time; every other
//! edit (node bump, parallel shift, restore from snapshot) produces a new,
//! wholesale-refitted value.

use std::sync::Arc;

use knotwork_math::guard::{ensure_all_finite, ensure_finite, ensure_strictly_increasing};
use knotwork_math::spline::{
    BasisFamily, FitterConfig, LeftBoundary, SegmentBasis, SegmentConstraintSet, SegmentFitter,
};
use serde::{Deserialize, Serialize};

use crate::error::{CurveError, CurveResult};
use crate::shape::{ShapeController, ShapeSettings};
use crate::traits::Curve;

/// Behaviour outside `[first knot, last knot]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Extrapolation {
    /// Hold the end node value.
    #[default]
    Flat,
    /// Continue along the end slope.
    Linear,
    /// Reject with [`CurveError::OutOfDomain`].
    None,
}

/// An ordered chain of fitted segments.
#[derive(Debug, Clone)]
pub struct Regime {
    knots: Vec<f64>,
    nodes: Vec<f64>,
    segments: Vec<SegmentBasis>,
    fitter: Arc<SegmentFitter>,
    extrapolation: Extrapolation,
    shape: ShapeSettings,
}

impl Regime {
    /// A regime with no knots.
    #[must_use]
    pub fn empty(fitter: Arc<SegmentFitter>, extrapolation: Extrapolation) -> Self {
        Self {
            knots: Vec::new(),
            nodes: Vec::new(),
            segments: Vec::new(),
            fitter,
            extrapolation,
            shape: ShapeSettings::default(),
        }
    }

    /// A regime with a single knot.
    pub fn anchored(
        fitter: Arc<SegmentFitter>,
        extrapolation: Extrapolation,
        knot: f64,
        value: f64,
    ) -> CurveResult<Self> {
        let mut regime = Self::empty(fitter, extrapolation);
        regime.push_node(knot, value)?;
        Ok(regime)
    }

    /// Fits the full segment chain through `(knots, nodes)`.
    pub fn from_nodes(
        fitter: Arc<SegmentFitter>,
        extrapolation: Extrapolation,
        knots: &[f64],
        nodes: &[f64],
    ) -> CurveResult<Self> {
        if knots.len() != nodes.len() {
            return Err(CurveError::invalid_input(format!(
                "{} knots but {} node values",
                knots.len(),
                nodes.len()
            )));
        }
        ensure_strictly_increasing("knots", knots)?;
        let mut regime = Self::empty(fitter, extrapolation);
        for (&knot, &value) in knots.iter().zip(nodes) {
            regime.push_node(knot, value)?;
        }
        Ok(regime)
    }

    /// Appends a knot, fitting the segment that ends at it.
    ///
    /// Leaves `self` untouched on failure.
    pub(crate) fn push_node(&mut self, knot: f64, value: f64) -> CurveResult<()> {
        let knot = ensure_finite("knot", knot)?;
        let value = ensure_finite("node value", value)?;

        if let (Some(&left), Some(&left_value)) = (self.knots.last(), self.nodes.last()) {
            if knot <= left {
                return Err(CurveError::invalid_input(format!(
                    "knot {knot} must lie after {left}"
                )));
            }
            let boundary = match self.segments.last() {
                Some(previous) => {
                    LeftBoundary::from_segment(previous, self.fitter.continuity_order())
                }
                None => LeftBoundary::value_only(left_value)?,
            };
            let segment_index = self.segments.len();
            let segment = self
                .fitter
                .fit(left, knot, &boundary, value)
                .map_err(|e| CurveError::from_segment_fit(segment_index, e))?;
            self.segments.push(segment);
        }

        self.knots.push(knot);
        self.nodes.push(value);
        Ok(())
    }

    /// Removes the last knot and the segment ending at it.
    pub(crate) fn pop_node(&mut self) {
        if self.knots.pop().is_some() {
            self.nodes.pop();
            self.segments.pop();
        }
    }

    /// The first `count` knots with their segments, unchanged.
    pub(crate) fn truncated(&self, count: usize) -> Self {
        let count = count.min(self.knots.len());
        Self {
            knots: self.knots[..count].to_vec(),
            nodes: self.nodes[..count].to_vec(),
            segments: self.segments[..count.saturating_sub(1)].to_vec(),
            fitter: Arc::clone(&self.fitter),
            extrapolation: self.extrapolation,
            shape: ShapeSettings::default(),
        }
    }

    /// Same knots and nodes with replacement segments.
    pub(crate) fn with_segments(&self, segments: Vec<SegmentBasis>, shape: ShapeSettings) -> Self {
        Self {
            knots: self.knots.clone(),
            nodes: self.nodes.clone(),
            segments,
            fitter: Arc::clone(&self.fitter),
            extrapolation: self.extrapolation,
            shape,
        }
    }

    /// Knots in increasing order.
    #[must_use]
    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    /// Node values, one per knot.
    #[must_use]
    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    /// Fitted segments; `segments()[i]` spans `knots[i]..knots[i + 1]`.
    #[must_use]
    pub fn segments(&self) -> &[SegmentBasis] {
        &self.segments
    }

    /// Shared segment fitter.
    #[must_use]
    pub fn fitter(&self) -> &Arc<SegmentFitter> {
        &self.fitter
    }

    /// Extrapolation policy.
    #[must_use]
    pub fn extrapolation(&self) -> Extrapolation {
        self.extrapolation
    }

    /// Shape passes applied to this regime.
    #[must_use]
    pub fn shape_settings(&self) -> ShapeSettings {
        self.shape
    }

    /// Number of knots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.knots.len()
    }

    /// True if the regime has no knots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.knots.is_empty()
    }

    /// `(knot, node)` pairs.
    #[must_use]
    pub fn node_pairs(&self) -> Vec<(f64, f64)> {
        self.knots
            .iter()
            .copied()
            .zip(self.nodes.iter().copied())
            .collect()
    }

    /// New regime with every node replaced, refitted and reshaped.
    pub fn with_nodes(&self, nodes: &[f64]) -> CurveResult<Self> {
        ensure_all_finite("node values", nodes)?;
        let raw = Self::from_nodes(
            Arc::clone(&self.fitter),
            self.extrapolation,
            &self.knots,
            nodes,
        )?;
        if self.shape.is_active() {
            ShapeController::new(self.shape)?.apply(&raw)
        } else {
            Ok(raw)
        }
    }

    /// New regime with node `index` set to `value`.
    pub fn with_node_value(&self, index: usize, value: f64) -> CurveResult<Self> {
        self.check_index(index)?;
        let mut nodes = self.nodes.clone();
        nodes[index] = value;
        self.with_nodes(&nodes)
    }

    /// New regime with every node set to `value`.
    pub fn flat(&self, value: f64) -> CurveResult<Self> {
        self.with_nodes(&vec![value; self.nodes.len()])
    }

    fn check_index(&self, index: usize) -> CurveResult<()> {
        if index < self.nodes.len() {
            Ok(())
        } else {
            Err(CurveError::invalid_input(format!(
                "node index {index} out of range for {} knots",
                self.nodes.len()
            )))
        }
    }

    fn segment_for(&self, x: f64) -> &SegmentBasis {
        let i = self.knots.partition_point(|&k| k < x);
        let last = self.segments.len() - 1;
        &self.segments[i.saturating_sub(1).min(last)]
    }

    fn edge_slope(&self, right: bool) -> f64 {
        match (right, self.segments.first(), self.segments.last()) {
            (false, Some(first), _) => first.derivative(first.left(), 1),
            (true, _, Some(last)) => last.derivative(last.right(), 1),
            _ => 0.0,
        }
    }

    fn bounds(&self) -> CurveResult<(f64, f64)> {
        self.domain()
            .ok_or_else(|| CurveError::invalid_input("regime has no knots"))
    }

    fn out_of_domain(&self, x: f64) -> CurveResult<(f64, f64)> {
        let (min, max) = self.bounds()?;
        if self.extrapolation == Extrapolation::None && (x < min || x > max) {
            return Err(CurveError::OutOfDomain { x, min, max });
        }
        Ok((min, max))
    }

    fn extrapolated_integral(&self, a: f64, b: f64, edge: f64, right: bool) -> f64 {
        let idx = if right { self.nodes.len() - 1 } else { 0 };
        let value = self.nodes[idx];
        match self.extrapolation {
            Extrapolation::Linear => {
                let slope = self.edge_slope(right);
                let mid = 0.5 * (a + b);
                (value + slope * (mid - edge)) * (b - a)
            }
            Extrapolation::Flat | Extrapolation::None => value * (b - a),
        }
    }

    /// Serializable copy of the regime.
    #[must_use]
    pub fn snapshot(&self) -> RegimeSnapshot {
        RegimeSnapshot {
            knots: self.knots.clone(),
            nodes: self.nodes.clone(),
            segments: self.segments.clone(),
            family: self.fitter.family(),
            constraints: self.fitter.constraint_set().clone(),
            fitter: self.fitter.config(),
            extrapolation: self.extrapolation,
            shape: self.shape,
        }
    }

    /// Restores a regime without re-running calibration.
    ///
    /// Checks that knots increase, that segment edges sit on the knots and
    /// that segments reproduce the node values at both ends.
    pub fn from_snapshot(snapshot: RegimeSnapshot) -> CurveResult<Self> {
        let RegimeSnapshot {
            knots,
            nodes,
            segments,
            family,
            constraints,
            fitter,
            extrapolation,
            shape,
        } = snapshot;

        ensure_strictly_increasing("knots", &knots)?;
        ensure_all_finite("node values", &nodes)?;
        if nodes.len() != knots.len() {
            return Err(CurveError::invalid_input(format!(
                "snapshot has {} knots but {} node values",
                knots.len(),
                nodes.len()
            )));
        }
        if segments.len() != knots.len().saturating_sub(1) {
            return Err(CurveError::invalid_input(format!(
                "snapshot has {} knots but {} segments",
                knots.len(),
                segments.len()
            )));
        }
        for (i, segment) in segments.iter().enumerate() {
            if segment.left() != knots[i] || segment.right() != knots[i + 1] {
                return Err(CurveError::invalid_input(format!(
                    "segment {i} spans [{}, {}], expected [{}, {}]",
                    segment.left(),
                    segment.right(),
                    knots[i],
                    knots[i + 1]
                )));
            }
            for (x, y) in [(knots[i], nodes[i]), (knots[i + 1], nodes[i + 1])] {
                if (segment.value(x) - y).abs() > 1e-9 * (1.0 + y.abs()) {
                    return Err(CurveError::invalid_input(format!(
                        "segment {i} does not reproduce node {y} at {x}"
                    )));
                }
            }
        }

        let fitter = SegmentFitter::new(family, constraints, fitter)?;
        Ok(Self {
            knots,
            nodes,
            segments,
            fitter: Arc::new(fitter),
            extrapolation,
            shape,
        })
    }
}

impl Curve for Regime {
    fn node_value(&self, index: usize) -> CurveResult<f64> {
        self.check_index(index)?;
        Ok(self.nodes[index])
    }

    fn evaluate(&self, x: f64) -> CurveResult<f64> {
        let x = ensure_finite("x", x)?;
        let (min, max) = self.out_of_domain(x)?;
        if self.segments.is_empty() {
            return Ok(self.nodes[0]);
        }
        if x < min || x > max {
            let right = x > max;
            let (edge, value) = if right {
                (max, self.nodes[self.nodes.len() - 1])
            } else {
                (min, self.nodes[0])
            };
            return Ok(match self.extrapolation {
                Extrapolation::Linear => value + self.edge_slope(right) * (x - edge),
                Extrapolation::Flat | Extrapolation::None => value,
            });
        }
        Ok(self.segment_for(x).value(x))
    }

    fn evaluate_derivative(&self, x: f64, order: usize) -> CurveResult<f64> {
        if order == 0 {
            return self.evaluate(x);
        }
        let x = ensure_finite("x", x)?;
        let (min, max) = self.out_of_domain(x)?;
        if self.segments.is_empty() {
            return Ok(0.0);
        }
        if x < min || x > max {
            return Ok(match (self.extrapolation, order) {
                (Extrapolation::Linear, 1) => self.edge_slope(x > max),
                _ => 0.0,
            });
        }
        Ok(self.segment_for(x).derivative(x, order))
    }

    fn integrate(&self, a: f64, b: f64) -> CurveResult<f64> {
        let a = ensure_finite("integration start", a)?;
        let b = ensure_finite("integration end", b)?;
        if a > b {
            return Ok(-self.integrate(b, a)?);
        }
        let (min, max) = self.bounds()?;
        self.out_of_domain(a)?;
        self.out_of_domain(b)?;
        if self.segments.is_empty() {
            return Ok(self.nodes[0] * (b - a));
        }

        let mut total = 0.0;
        if a < min {
            total += self.extrapolated_integral(a, b.min(min), min, false);
        }
        if b > max {
            total += self.extrapolated_integral(a.max(max), b, max, true);
        }
        for segment in &self.segments {
            let lo = a.max(segment.left());
            let hi = b.min(segment.right());
            if lo < hi {
                total += segment.integral(lo, hi);
            }
        }
        Ok(total)
    }

    fn domain(&self) -> Option<(f64, f64)> {
        Some((*self.knots.first()?, *self.knots.last()?))
    }

    fn bump_node(&self, index: usize, delta: f64) -> CurveResult<Self> {
        self.check_index(index)?;
        let delta = ensure_finite("bump", delta)?;
        self.with_node_value(index, self.nodes[index] + delta)
    }
}

/// Serializable state of a [`Regime`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    /// Knots.
    pub knots: Vec<f64>,
    /// Node values.
    pub nodes: Vec<f64>,
    /// Segment bases.
    pub segments: Vec<SegmentBasis>,
    /// Basis family used for refits.
    pub family: BasisFamily,
    /// Continuity, penalty and constraints used for refits.
    pub constraints: SegmentConstraintSet,
    /// Fitter numerics.
    pub fitter: FitterConfig,
    /// Extrapolation policy.
    pub extrapolation: Extrapolation,
    /// Shape passes applied to the segments.
    #[serde(default)]
    pub shape: ShapeSettings,
}
