//! Per-segment coefficient fitting.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::basis::{BasisFamily, SegmentBasis};
use super::constraint::SegmentConstraintSet;
use crate::error::{MathError, MathResult};
use crate::guard::{ensure_all_finite, ensure_finite, ensure_positive};
use crate::linear_algebra::solve_min_penalty;
use crate::quadrature::composite_gauss_legendre;

/// Default cap on the condition number of a segment system.
pub const DEFAULT_MAX_CONDITION_NUMBER: f64 = 1e12;

/// Numerical settings for [`SegmentFitter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitterConfig {
    /// Systems with a larger condition number are rejected.
    #[serde(default = "default_max_condition_number")]
    pub max_condition_number: f64,
}

fn default_max_condition_number() -> f64 {
    DEFAULT_MAX_CONDITION_NUMBER
}

impl Default for FitterConfig {
    fn default() -> Self {
        Self {
            max_condition_number: DEFAULT_MAX_CONDITION_NUMBER,
        }
    }
}

/// State a segment inherits at its left edge: the value and the derivatives
/// of order `1..` of the segment before it.
#[derive(Debug, Clone, PartialEq)]
pub struct LeftBoundary {
    value: f64,
    derivatives: Vec<f64>,
}

impl LeftBoundary {
    /// Value only; used for the first segment of a curve.
    pub fn value_only(value: f64) -> MathResult<Self> {
        Self::new(value, Vec::new())
    }

    /// Value plus derivatives, `derivatives[k - 1]` being the k-th.
    pub fn new(value: f64, derivatives: Vec<f64>) -> MathResult<Self> {
        let value = ensure_finite("left boundary value", value)?;
        ensure_all_finite("left boundary derivatives", &derivatives)?;
        Ok(Self { value, derivatives })
    }

    /// Reads the state at the right edge of `segment`, up to `order`.
    #[must_use]
    pub fn from_segment(segment: &SegmentBasis, order: usize) -> Self {
        let x = segment.right();
        Self {
            value: segment.value(x),
            derivatives: (1..=order).map(|k| segment.derivative(x, k)).collect(),
        }
    }

    /// Boundary value.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Inherited derivatives.
    #[must_use]
    pub fn derivatives(&self) -> &[f64] {
        &self.derivatives
    }
}

/// Fits one segment's coefficients from its inherited left state, its right
/// node value and any interior constraints.
///
/// The conditions are hard: the left value, the inherited derivatives up to
/// the continuity order, the right value and every applicable
/// [`ResponseConstraint`](super::ResponseConstraint) hold exactly. Any
/// freedom left over is resolved by minimising
/// `∫ (d^m f / du^m)² du` over the segment, `m` being the roughness penalty
/// order.
#[derive(Debug, Clone)]
pub struct SegmentFitter {
    family: BasisFamily,
    constraints: SegmentConstraintSet,
    config: FitterConfig,
    penalty: DMatrix<f64>,
}

impl SegmentFitter {
    /// Creates a fitter and precomputes the penalty matrix.
    ///
    /// # Errors
    ///
    /// Returns [`MathError::InvalidInput`] if the family has fewer than
    /// `continuity_order + 2` basis functions.
    pub fn new(
        family: BasisFamily,
        constraints: SegmentConstraintSet,
        config: FitterConfig,
    ) -> MathResult<Self> {
        ensure_positive("max condition number", config.max_condition_number)?;
        let required = constraints.continuity_order() + 2;
        if family.size() < required {
            return Err(MathError::invalid_input(format!(
                "{} basis with {} functions cannot carry C{} continuity (needs {required})",
                family.name(),
                family.size(),
                constraints.continuity_order()
            )));
        }

        let n = family.size();
        let m = constraints.roughness_penalty_order();
        let mut penalty = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                let entry = composite_gauss_legendre(
                    |u| family.local_derivative(i, u, m) * family.local_derivative(j, u, m),
                    0.0,
                    1.0,
                    4,
                );
                penalty[(i, j)] = entry;
                penalty[(j, i)] = entry;
            }
        }

        Ok(Self {
            family,
            constraints,
            config,
            penalty,
        })
    }

    /// Basis family of every fitted segment.
    #[must_use]
    pub fn family(&self) -> BasisFamily {
        self.family
    }

    /// Constraint set.
    #[must_use]
    pub fn constraint_set(&self) -> &SegmentConstraintSet {
        &self.constraints
    }

    /// Numerical settings.
    #[must_use]
    pub fn config(&self) -> FitterConfig {
        self.config
    }

    /// Continuity order shortcut.
    #[must_use]
    pub fn continuity_order(&self) -> usize {
        self.constraints.continuity_order()
    }

    /// Fits the segment `[left, right]`.
    ///
    /// # Errors
    ///
    /// - [`MathError::IllConditioned`] if the conditions are dependent or
    ///   badly conditioned
    /// - [`MathError::Underdetermined`] if conditions plus penalty leave
    ///   coefficients free
    pub fn fit(
        &self,
        left: f64,
        right: f64,
        boundary: &LeftBoundary,
        right_value: f64,
    ) -> MathResult<SegmentBasis> {
        let right_value = ensure_finite("right node value", right_value)?;
        if !(left < right) {
            return Err(MathError::invalid_input(format!(
                "segment [{left}, {right}] is empty"
            )));
        }

        let h = right - left;
        let n = self.family.size();
        let inherited = self.continuity_order().min(boundary.derivatives.len());

        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(inherited + 2);
        let mut targets: Vec<f64> = Vec::with_capacity(inherited + 2);

        rows.push(self.family.row(0.0, 0));
        targets.push(boundary.value);

        for k in 1..=inherited {
            rows.push(self.family.row(0.0, k));
            targets.push(boundary.derivatives[k - 1] * h.powi(k as i32));
        }

        rows.push(self.family.row(1.0, 0));
        targets.push(right_value);

        for constraint in self.constraints.applicable(left, right) {
            // Same row as the right node value: keep it only as a consistency check.
            if let Some(pinned) = constraint.pinned_value_at(right) {
                if (pinned - right_value).abs() > 1e-12 * pinned.abs().max(1.0) {
                    return Err(MathError::invalid_input(format!(
                        "value constraint at knot {right} asks for {pinned} but the node is {right_value}"
                    )));
                }
                continue;
            }
            let mut row = vec![0.0; n];
            for term in constraint.terms() {
                let u = (term.point - left) / h;
                let scale = term.weight / h.powi(term.order as i32);
                for (j, entry) in row.iter_mut().enumerate() {
                    *entry += scale * self.family.local_derivative(j, u, term.order);
                }
            }
            rows.push(row);
            targets.push(constraint.target());
        }

        self.solve(left, right, &rows, targets)
    }

    /// Fits `[left, right]` in this fitter's family through `(left, y0)` and
    /// `(right, y1)` with end slopes `s0` and `s1` (in `x` units), ignoring
    /// interior constraints.
    ///
    /// # Errors
    ///
    /// - [`MathError::InvalidInput`] if the family has fewer than four basis
    ///   functions
    /// - [`MathError::IllConditioned`] or [`MathError::Underdetermined`] as
    ///   for [`fit`](Self::fit)
    pub fn fit_hermite(
        &self,
        left: f64,
        right: f64,
        y0: f64,
        y1: f64,
        s0: f64,
        s1: f64,
    ) -> MathResult<SegmentBasis> {
        ensure_all_finite("hermite end conditions", &[y0, y1, s0, s1])?;
        if !(left < right) {
            return Err(MathError::invalid_input(format!(
                "segment [{left}, {right}] is empty"
            )));
        }
        if self.family.size() < 4 {
            return Err(MathError::invalid_input(format!(
                "{} basis with {} functions cannot match two end values and two end slopes",
                self.family.name(),
                self.family.size()
            )));
        }

        let h = right - left;
        let rows = vec![
            self.family.row(0.0, 0),
            self.family.row(0.0, 1),
            self.family.row(1.0, 0),
            self.family.row(1.0, 1),
        ];
        self.solve(left, right, &rows, vec![y0, s0 * h, y1, s1 * h])
    }

    fn solve(
        &self,
        left: f64,
        right: f64,
        rows: &[Vec<f64>],
        targets: Vec<f64>,
    ) -> MathResult<SegmentBasis> {
        let a = DMatrix::from_fn(rows.len(), self.family.size(), |i, j| rows[i][j]);
        let b = DVector::from_vec(targets);

        let solution = solve_min_penalty(&a, &b, &self.penalty, self.config.max_condition_number)
            .map_err(|e| {
                log::debug!("segment [{left}, {right}] rejected: {e}");
                e
            })?;

        SegmentBasis::new(left, right, self.family, solution.coefficients)
    }
}
