//! Capability traits at the engine boundary.
//!
//! [`Curve`] is what the engine exposes: a calibrated (or in-progress)
//! curve that instruments read from. [`CalibrationInstrument`] is what the
//! engine consumes: anything with a maturity, a quote and a way to value
//! itself off a curve. Both are deliberately one level deep so that callers
//! can wrap their own instrument models without adopting a hierarchy.

use std::fmt;

use crate::error::CurveResult;

/// Read access to a piecewise curve.
///
/// Implementations are immutable values; [`bump_node`](Curve::bump_node)
/// returns a new curve.
///
/// # Example
///
/// ```rust,ignore
/// use knotwork_curves::traits::Curve;
///
/// fn average<C: Curve>(curve: &C, a: f64, b: f64) -> CurveResult<f64> {
///     Ok(curve.integrate(a, b)? / (b - a))
/// }
/// ```
pub trait Curve: Send + Sync {
    /// Node value at knot `index`.
    fn node_value(&self, index: usize) -> CurveResult<f64>;

    /// Curve value at `x`.
    fn evaluate(&self, x: f64) -> CurveResult<f64>;

    /// `order`-th derivative at `x`.
    fn evaluate_derivative(&self, x: f64, order: usize) -> CurveResult<f64>;

    /// Definite integral over `[a, b]`.
    fn integrate(&self, a: f64, b: f64) -> CurveResult<f64>;

    /// First and last knot, or `None` for a curve without knots.
    fn domain(&self) -> Option<(f64, f64)>;

    /// New curve with node `index` moved by `delta` and every affected
    /// segment refitted.
    fn bump_node(&self, index: usize, delta: f64) -> CurveResult<Self>
    where
        Self: Sized;
}

/// An instrument the bootstrapper can calibrate a node to.
///
/// `fair_value` must depend only on the curve up to `maturity()`; the
/// sequential bootstrap relies on it.
pub trait CalibrationInstrument: Send + Sync + fmt::Debug {
    /// Knot this instrument determines.
    fn maturity(&self) -> f64;

    /// Market quote to reprice.
    fn target_quote(&self) -> f64;

    /// Model value of the quote on `curve`.
    fn fair_value(&self, curve: &dyn Curve) -> CurveResult<f64>;

    /// Human-readable label used in errors and reports.
    fn description(&self) -> String;
}
