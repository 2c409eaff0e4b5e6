//! Basis families and fitted spline segments.

use serde::{Deserialize, Serialize};

use crate::error::{MathError, MathResult};
use crate::guard::{ensure_all_finite, ensure_finite, ensure_positive};

/// Family of basis functions spanning a segment.
///
/// Basis functions are written in the local coordinate
/// `u = (x - left) / (right - left)`, so the same family describes every
/// segment regardless of its width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", try_from = "RawBasisFamily")]
pub enum BasisFamily {
    /// Monomials `1, u, ..., u^degree`.
    Polynomial {
        /// Highest power (at least 1).
        degree: usize,
    },
    /// `{1, u, cosh(τ(u - ½)), sinh(τ(u - ½))}`, hyperbolic terms scaled by
    /// `1 / cosh(τ/2)`.
    ///
    /// Large tension pulls the segment towards its chord.
    HyperbolicTension {
        /// Tension parameter τ (positive).
        tension: f64,
    },
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RawBasisFamily {
    Polynomial { degree: usize },
    HyperbolicTension { tension: f64 },
}

impl TryFrom<RawBasisFamily> for BasisFamily {
    type Error = MathError;

    fn try_from(raw: RawBasisFamily) -> MathResult<Self> {
        match raw {
            RawBasisFamily::Polynomial { degree } => Self::polynomial(degree),
            RawBasisFamily::HyperbolicTension { tension } => Self::hyperbolic_tension(tension),
        }
    }
}

impl Default for BasisFamily {
    fn default() -> Self {
        Self::cubic()
    }
}

impl BasisFamily {
    /// Polynomial family of the given degree.
    pub fn polynomial(degree: usize) -> MathResult<Self> {
        if degree == 0 {
            return Err(MathError::invalid_input(
                "polynomial basis degree must be at least 1",
            ));
        }
        Ok(Self::Polynomial { degree })
    }

    /// Cubic polynomial family.
    #[must_use]
    pub fn cubic() -> Self {
        Self::Polynomial { degree: 3 }
    }

    /// Hyperbolic tension family.
    pub fn hyperbolic_tension(tension: f64) -> MathResult<Self> {
        let tension = ensure_positive("hyperbolic tension", tension)?;
        Ok(Self::HyperbolicTension { tension })
    }

    /// Number of basis functions (and coefficients).
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Polynomial { degree } => degree + 1,
            Self::HyperbolicTension { .. } => 4,
        }
    }

    /// Human-readable family name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Polynomial { .. } => "Polynomial",
            Self::HyperbolicTension { .. } => "Hyperbolic tension",
        }
    }

    /// `order`-th derivative of basis function `index` with respect to `u`.
    #[must_use]
    pub fn local_derivative(&self, index: usize, u: f64, order: usize) -> f64 {
        match *self {
            Self::Polynomial { .. } => {
                if order > index {
                    return 0.0;
                }
                let falling: f64 = ((index - order + 1)..=index).map(|k| k as f64).product();
                falling * u.powi((index - order) as i32)
            }
            Self::HyperbolicTension { tension } => match index {
                0 => f64::from(order == 0),
                1 => match order {
                    0 => u,
                    1 => 1.0,
                    _ => 0.0,
                },
                _ => {
                    let arg = tension * (u - 0.5);
                    let scale = tension.powi(order as i32) / (0.5 * tension).cosh();
                    // d/du swaps cosh and sinh
                    let use_cosh = (index == 2) == (order % 2 == 0);
                    scale * if use_cosh { arg.cosh() } else { arg.sinh() }
                }
            },
        }
    }

    /// Antiderivative in `u` of basis function `index`, zero at `u = ½` for
    /// the hyperbolic terms and at `u = 0` otherwise.
    fn local_antiderivative(&self, index: usize, u: f64) -> f64 {
        match *self {
            Self::Polynomial { .. } => u.powi(index as i32 + 1) / (index as f64 + 1.0),
            Self::HyperbolicTension { tension } => match index {
                0 => u,
                1 => 0.5 * u * u,
                _ => {
                    let arg = tension * (u - 0.5);
                    let scale = 1.0 / (tension * (0.5 * tension).cosh());
                    scale * if index == 2 { arg.sinh() } else { arg.cosh() - 1.0 }
                }
            },
        }
    }

    /// Values of every basis function's `order`-th `u`-derivative at `u`.
    #[must_use]
    pub fn row(&self, u: f64, order: usize) -> Vec<f64> {
        (0..self.size())
            .map(|i| self.local_derivative(i, u, order))
            .collect()
    }
}

/// A fitted segment: a basis family and its coefficients on `[left, right]`.
///
/// Immutable once built; refits produce new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSegmentBasis")]
pub struct SegmentBasis {
    left: f64,
    right: f64,
    family: BasisFamily,
    coefficients: Vec<f64>,
}

#[derive(Deserialize)]
struct RawSegmentBasis {
    left: f64,
    right: f64,
    family: BasisFamily,
    coefficients: Vec<f64>,
}

impl TryFrom<RawSegmentBasis> for SegmentBasis {
    type Error = MathError;

    fn try_from(raw: RawSegmentBasis) -> MathResult<Self> {
        Self::new(raw.left, raw.right, raw.family, raw.coefficients)
    }
}

impl SegmentBasis {
    /// Creates a segment from explicit coefficients.
    pub fn new(
        left: f64,
        right: f64,
        family: BasisFamily,
        coefficients: Vec<f64>,
    ) -> MathResult<Self> {
        let left = ensure_finite("segment left edge", left)?;
        let right = ensure_finite("segment right edge", right)?;
        if left >= right {
            return Err(MathError::invalid_input(format!(
                "segment [{left}, {right}] is empty"
            )));
        }
        if coefficients.len() != family.size() {
            return Err(MathError::DimensionMismatch {
                expected: family.size(),
                actual: coefficients.len(),
            });
        }
        ensure_all_finite("segment coefficients", &coefficients)?;
        Ok(Self {
            left,
            right,
            family,
            coefficients,
        })
    }

    /// Cubic Hermite segment through `(left, y0)` and `(right, y1)` with end
    /// slopes `s0` and `s1` (in `x` units).
    pub fn hermite(left: f64, right: f64, y0: f64, y1: f64, s0: f64, s1: f64) -> MathResult<Self> {
        let h = right - left;
        let m0 = s0 * h;
        let m1 = s1 * h;
        let coefficients = vec![
            y0,
            m0,
            3.0 * (y1 - y0) - 2.0 * m0 - m1,
            2.0 * (y0 - y1) + m0 + m1,
        ];
        Self::new(left, right, BasisFamily::cubic(), coefficients)
    }

    /// Straight line through both end values.
    pub fn linear(left: f64, right: f64, y0: f64, y1: f64) -> MathResult<Self> {
        Self::chord(BasisFamily::Polynomial { degree: 1 }, left, right, y0, y1)
    }

    /// Straight line through both end values, expressed in `family`.
    ///
    /// Every family starts with `1` and `u`, so only those two coefficients
    /// are set.
    pub fn chord(family: BasisFamily, left: f64, right: f64, y0: f64, y1: f64) -> MathResult<Self> {
        if family.size() < 2 {
            return Err(MathError::invalid_input(format!(
                "{} basis with {} functions cannot hold a line",
                family.name(),
                family.size()
            )));
        }
        let mut coefficients = vec![0.0; family.size()];
        coefficients[0] = y0;
        coefficients[1] = y1 - y0;
        Self::new(left, right, family, coefficients)
    }

    /// Constant segment.
    pub fn constant(left: f64, right: f64, value: f64) -> MathResult<Self> {
        Self::linear(left, right, value, value)
    }

    /// Left edge.
    #[must_use]
    pub fn left(&self) -> f64 {
        self.left
    }

    /// Right edge.
    #[must_use]
    pub fn right(&self) -> f64 {
        self.right
    }

    /// Segment width.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    /// Basis family.
    #[must_use]
    pub fn family(&self) -> BasisFamily {
        self.family
    }

    /// Coefficients in basis order.
    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// True if `x` lies in `[left, right]`.
    #[must_use]
    pub fn contains(&self, x: f64) -> bool {
        x >= self.left && x <= self.right
    }

    fn local(&self, x: f64) -> f64 {
        (x - self.left) / self.width()
    }

    /// Value at `x`. Points outside the segment extend its functional form.
    #[must_use]
    pub fn value(&self, x: f64) -> f64 {
        self.derivative(x, 0)
    }

    /// `order`-th derivative with respect to `x`.
    #[must_use]
    pub fn derivative(&self, x: f64, order: usize) -> f64 {
        let u = self.local(x);
        let sum: f64 = self
            .coefficients
            .iter()
            .enumerate()
            .map(|(i, c)| c * self.family.local_derivative(i, u, order))
            .sum();
        sum / self.width().powi(order as i32)
    }

    /// Definite integral over `[a, b]`.
    #[must_use]
    pub fn integral(&self, a: f64, b: f64) -> f64 {
        let (ua, ub) = (self.local(a), self.local(b));
        let sum: f64 = self
            .coefficients
            .iter()
            .enumerate()
            .map(|(i, c)| {
                c * (self.family.local_antiderivative(i, ub)
                    - self.family.local_antiderivative(i, ua))
            })
            .sum();
        sum * self.width()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quadrature::gauss_legendre;
    use approx::assert_relative_eq;

    #[test]
    fn test_family_validation() {
        assert!(BasisFamily::polynomial(0).is_err());
        assert_eq!(BasisFamily::polynomial(3).unwrap().size(), 4);
        assert!(BasisFamily::hyperbolic_tension(0.0).is_err());
        assert!(BasisFamily::hyperbolic_tension(f64::NAN).is_err());
        assert_eq!(BasisFamily::hyperbolic_tension(1.0).unwrap().size(), 4);
    }

    #[test]
    fn test_family_serde_is_tagged_and_validated() {
        let json = serde_json::to_string(&BasisFamily::cubic()).unwrap();
        assert!(json.contains("\"kind\":\"polynomial\""));
        let back: BasisFamily = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BasisFamily::cubic());

        let bad: Result<BasisFamily, _> =
            serde_json::from_str(r#"{"kind":"hyperbolic_tension","tension":-1.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_hermite_matches_end_conditions() {
        let seg = SegmentBasis::hermite(2.0, 5.0, 0.015, 0.02, 0.005, -0.001).unwrap();
        assert_relative_eq!(seg.value(2.0), 0.015, epsilon = 1e-15);
        assert_relative_eq!(seg.value(5.0), 0.02, epsilon = 1e-15);
        assert_relative_eq!(seg.derivative(2.0, 1), 0.005, epsilon = 1e-15);
        assert_relative_eq!(seg.derivative(5.0, 1), -0.001, epsilon = 1e-15);
    }

    #[test]
    fn test_hyperbolic_derivatives_match_finite_differences() {
        let family = BasisFamily::hyperbolic_tension(3.0).unwrap();
        let seg = SegmentBasis::new(1.0, 2.5, family, vec![0.1, 0.2, -0.3, 0.4]).unwrap();
        let h = 1e-5;
        for x in [1.0, 1.4, 2.2] {
            let fd1 = (seg.value(x + h) - seg.value(x - h)) / (2.0 * h);
            assert_relative_eq!(seg.derivative(x, 1), fd1, epsilon = 1e-7);
            let fd2 = (seg.derivative(x + h, 1) - seg.derivative(x - h, 1)) / (2.0 * h);
            assert_relative_eq!(seg.derivative(x, 2), fd2, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_integral_matches_quadrature() {
        let family = BasisFamily::hyperbolic_tension(2.0).unwrap();
        let seg = SegmentBasis::new(0.5, 3.0, family, vec![0.01, 0.02, 0.005, -0.003]).unwrap();
        let exact = seg.integral(0.7, 2.9);
        let numeric = gauss_legendre(|x| seg.value(x), 0.7, 2.9);
        assert_relative_eq!(exact, numeric, epsilon = 1e-12);

        let cubic = SegmentBasis::hermite(1.0, 3.0, 1.0, 2.0, 0.0, 0.5).unwrap();
        let numeric = gauss_legendre(|x| cubic.value(x), 1.0, 3.0);
        assert_relative_eq!(cubic.integral(1.0, 3.0), numeric, epsilon = 1e-13);
    }

    #[test]
    fn test_constructor_rejects_bad_input() {
        let cubic = BasisFamily::cubic();
        assert!(SegmentBasis::new(1.0, 1.0, cubic, vec![0.0; 4]).is_err());
        assert!(matches!(
            SegmentBasis::new(0.0, 1.0, cubic, vec![0.0; 3]),
            Err(MathError::DimensionMismatch { .. })
        ));
        assert!(SegmentBasis::new(0.0, 1.0, cubic, vec![0.0, f64::NAN, 0.0, 0.0]).is_err());
    }

    #[test]
    fn test_constant_and_linear() {
        let flat = SegmentBasis::constant(0.0, 4.0, 0.03).unwrap();
        assert_relative_eq!(flat.value(2.7), 0.03);
        assert_relative_eq!(flat.derivative(2.7, 1), 0.0);

        let line = SegmentBasis::linear(1.0, 2.0, 0.01, 0.015).unwrap();
        assert_relative_eq!(line.value(1.5), 0.0125, epsilon = 1e-15);
        assert_relative_eq!(line.integral(1.0, 2.0), 0.0125, epsilon = 1e-15);
    }

    #[test]
    fn test_chord_in_any_family() {
        for family in [BasisFamily::cubic(), BasisFamily::hyperbolic_tension(4.0).unwrap()] {
            let chord = SegmentBasis::chord(family, 1.0, 3.0, 0.01, 0.02).unwrap();
            assert_eq!(chord.family(), family);
            assert_relative_eq!(chord.value(2.0), 0.015, epsilon = 1e-15);
            assert_relative_eq!(chord.derivative(2.5, 1), 0.005, epsilon = 1e-14);
            assert_relative_eq!(chord.derivative(2.5, 2), 0.0, epsilon = 1e-14);
        }
    }
}
