//! Segment constraint sets.

use serde::{Deserialize, Serialize};

use crate::error::{MathError, MathResult};
use crate::guard::ensure_finite;

/// One term of a [`ResponseConstraint`]: `weight * d^order f(point)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintTerm {
    /// Abscissa the response is read at.
    pub point: f64,
    /// Derivative order (0 for the value itself).
    pub order: usize,
    /// Multiplier.
    pub weight: f64,
}

impl ConstraintTerm {
    /// Creates a validated term.
    pub fn new(point: f64, order: usize, weight: f64) -> MathResult<Self> {
        Ok(Self {
            point: ensure_finite("constraint point", point)?,
            order,
            weight: ensure_finite("constraint weight", weight)?,
        })
    }
}

/// A linear condition `Σ weight · d^order f(point) = target` on one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResponseConstraint")]
pub struct ResponseConstraint {
    terms: Vec<ConstraintTerm>,
    target: f64,
}

#[derive(Deserialize)]
struct RawResponseConstraint {
    terms: Vec<ConstraintTerm>,
    target: f64,
}

impl TryFrom<RawResponseConstraint> for ResponseConstraint {
    type Error = MathError;

    fn try_from(raw: RawResponseConstraint) -> MathResult<Self> {
        Self::new(raw.terms, raw.target)
    }
}

impl ResponseConstraint {
    /// Creates a constraint from its terms and target.
    pub fn new(terms: Vec<ConstraintTerm>, target: f64) -> MathResult<Self> {
        if terms.is_empty() {
            return Err(MathError::invalid_input("constraint needs at least one term"));
        }
        for term in &terms {
            ConstraintTerm::new(term.point, term.order, term.weight)?;
        }
        Ok(Self {
            terms,
            target: ensure_finite("constraint target", target)?,
        })
    }

    /// Pins the curve value at `point` to `target`.
    pub fn value_at(point: f64, target: f64) -> MathResult<Self> {
        Self::new(vec![ConstraintTerm::new(point, 0, 1.0)?], target)
    }

    /// Pins the `order`-th derivative at `point` to `target`.
    pub fn derivative_at(point: f64, order: usize, target: f64) -> MathResult<Self> {
        Self::new(vec![ConstraintTerm::new(point, order, 1.0)?], target)
    }

    /// Terms of the constraint.
    #[must_use]
    pub fn terms(&self) -> &[ConstraintTerm] {
        &self.terms
    }

    /// Right-hand side.
    #[must_use]
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Smallest and largest point referenced.
    #[must_use]
    pub fn span(&self) -> (f64, f64) {
        self.terms
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| {
                (lo.min(t.point), hi.max(t.point))
            })
    }

    /// The value this constraint forces at `x`, if it only reads the curve
    /// value at `x` itself.
    #[must_use]
    pub fn pinned_value_at(&self, x: f64) -> Option<f64> {
        let only_value_at_x = self.terms.iter().all(|t| t.order == 0 && t.point == x);
        let weight: f64 = self.terms.iter().map(|t| t.weight).sum();
        (only_value_at_x && weight != 0.0).then(|| self.target / weight)
    }

    /// True if every point lies in `(left, right]`.
    #[must_use]
    pub fn applies_to(&self, left: f64, right: f64) -> bool {
        let (lo, hi) = self.span();
        lo > left && hi <= right
    }
}

/// Continuity order, roughness penalty order and interior constraints shared
/// by every segment of a curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConstraintSet")]
pub struct SegmentConstraintSet {
    continuity_order: usize,
    roughness_penalty_order: usize,
    constraints: Vec<ResponseConstraint>,
}

#[derive(Deserialize)]
struct RawConstraintSet {
    continuity_order: usize,
    roughness_penalty_order: usize,
    #[serde(default)]
    constraints: Vec<ResponseConstraint>,
}

impl TryFrom<RawConstraintSet> for SegmentConstraintSet {
    type Error = MathError;

    fn try_from(raw: RawConstraintSet) -> MathResult<Self> {
        Self::new(
            raw.continuity_order,
            raw.roughness_penalty_order,
            raw.constraints,
        )
    }
}

impl Default for SegmentConstraintSet {
    /// C1 continuity with a curvature penalty and no extra constraints.
    fn default() -> Self {
        Self {
            continuity_order: 1,
            roughness_penalty_order: 2,
            constraints: Vec::new(),
        }
    }
}

impl SegmentConstraintSet {
    /// Creates a constraint set.
    ///
    /// # Errors
    ///
    /// Returns [`MathError::InvalidInput`] if `roughness_penalty_order` is 0.
    pub fn new(
        continuity_order: usize,
        roughness_penalty_order: usize,
        constraints: Vec<ResponseConstraint>,
    ) -> MathResult<Self> {
        if roughness_penalty_order == 0 {
            return Err(MathError::invalid_input(
                "roughness penalty derivative order must be positive",
            ));
        }
        Ok(Self {
            continuity_order,
            roughness_penalty_order,
            constraints,
        })
    }

    /// C2 continuity with a curvature penalty.
    pub fn c2(constraints: Vec<ResponseConstraint>) -> MathResult<Self> {
        Self::new(2, 2, constraints)
    }

    /// Continuity order `Ck`.
    #[must_use]
    pub fn continuity_order(&self) -> usize {
        self.continuity_order
    }

    /// Derivative order of the roughness penalty.
    #[must_use]
    pub fn roughness_penalty_order(&self) -> usize {
        self.roughness_penalty_order
    }

    /// Interior constraints.
    #[must_use]
    pub fn constraints(&self) -> &[ResponseConstraint] {
        &self.constraints
    }

    /// Constraints that apply to the segment `(left, right]`.
    pub fn applicable(&self, left: f64, right: f64) -> impl Iterator<Item = &ResponseConstraint> {
        self.constraints
            .iter()
            .filter(move |c| c.applies_to(left, right))
    }
}
