//! Bracketed root-finding algorithms.
//!
//! Every solver here works on a sign-changing bracket and accepts a
//! *fallible* objective, `FnMut(f64) -> Result<f64, E>`. Calibration
//! objectives refit a spline segment on each evaluation, and that refit can
//! fail; the failure is propagated untouched instead of being folded into a
//! numeric sentinel.
//!
//! - [`guarded_secant`]: secant steps guarded by bisection (default)
//! - [`brent`]: Brent's method (inverse quadratic + secant + bisection)
//! - [`bisection`]: plain interval halving
//!
//! # Choosing a Solver
//!
//! | Solver | Speed | Reliability | Notes |
//! |--------|-------|-------------|-------|
//! | Guarded secant | Fast (superlinear) | Guaranteed | Uses the caller's guess |
//! | Brent | Fast (superlinear) | Guaranteed | Ignores the guess |
//! | Bisection | Slow (linear) | Guaranteed | Reference / debugging |
//!
//! # Example
//!
//! ```rust
//! use knotwork_math::solvers::{guarded_secant, Bracket, SolverConfig};
//! use knotwork_math::MathError;
//!
//! let bracket = Bracket::new(1.0, 2.0).unwrap();
//! let result = guarded_secant(
//!     |x: f64| Ok::<_, MathError>(x * x - 2.0),
//!     bracket,
//!     Some(1.5),
//!     &SolverConfig::default(),
//! )
//! .unwrap();
//! assert!((result.root - std::f64::consts::SQRT_2).abs() < 1e-10);
//! ```

mod bisection;
mod brent;
mod guarded;

pub use bisection::bisection;
pub use brent::brent;
pub use guarded::guarded_secant;

use serde::{Deserialize, Serialize};

use crate::error::{MathError, MathResult};
use crate::guard::ensure_finite;

/// Default tolerance on the objective residual.
pub const DEFAULT_TOLERANCE: f64 = 1e-12;

/// Default maximum iterations for root-finding algorithms.
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;

/// Configuration for root-finding algorithms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// Convergence tolerance on `|f(x)|`.
    pub tolerance: f64,
    /// Maximum number of iterations.
    pub max_iterations: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl SolverConfig {
    /// Creates a new solver configuration.
    #[must_use]
    pub fn new(tolerance: f64, max_iterations: u32) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }

    /// Sets the tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the maximum iterations.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// A closed search interval `[lower, upper]` for a bracketed solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBracket")]
pub struct Bracket {
    lower: f64,
    upper: f64,
}

#[derive(Deserialize)]
struct RawBracket {
    lower: f64,
    upper: f64,
}

impl TryFrom<RawBracket> for Bracket {
    type Error = MathError;

    fn try_from(raw: RawBracket) -> MathResult<Self> {
        Self::new(raw.lower, raw.upper)
    }
}

impl Default for Bracket {
    /// `[-1, 1]`, wide enough for rate-like node values.
    fn default() -> Self {
        Self {
            lower: -1.0,
            upper: 1.0,
        }
    }
}

impl Bracket {
    /// Creates a bracket, rejecting non-finite or empty intervals.
    pub fn new(lower: f64, upper: f64) -> MathResult<Self> {
        let lower = ensure_finite("bracket lower bound", lower)?;
        let upper = ensure_finite("bracket upper bound", upper)?;
        if lower >= upper {
            return Err(MathError::invalid_input(format!(
                "bracket lower bound {lower} must be below upper bound {upper}"
            )));
        }
        Ok(Self { lower, upper })
    }

    /// Lower end of the interval.
    #[must_use]
    pub fn lower(&self) -> f64 {
        self.lower
    }

    /// Upper end of the interval.
    #[must_use]
    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Returns true if `x` lies strictly inside the interval.
    #[must_use]
    pub fn contains(&self, x: f64) -> bool {
        x > self.lower && x < self.upper
    }
}

/// Root-finding method selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RootMethod {
    /// Secant steps guarded by bisection.
    #[default]
    GuardedSecant,
    /// Brent's method.
    Brent,
    /// Plain bisection.
    Bisection,
}

impl RootMethod {
    /// Returns the name of the method.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            RootMethod::GuardedSecant => "Guarded secant",
            RootMethod::Brent => "Brent",
            RootMethod::Bisection => "Bisection",
        }
    }
}

/// Runs the selected method on `f` over `bracket`.
///
/// `initial_guess` is only used by [`RootMethod::GuardedSecant`].
pub fn find_root<F, E>(
    method: RootMethod,
    f: F,
    bracket: Bracket,
    initial_guess: Option<f64>,
    config: &SolverConfig,
) -> Result<SolverResult, E>
where
    F: FnMut(f64) -> Result<f64, E>,
    E: From<MathError>,
{
    match method {
        RootMethod::GuardedSecant => guarded_secant(f, bracket, initial_guess, config),
        RootMethod::Brent => brent(f, bracket, config),
        RootMethod::Bisection => bisection(f, bracket, config),
    }
}

/// Result of a root-finding iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverResult {
    /// The root found.
    pub root: f64,
    /// Number of objective evaluations after the bracket check.
    pub iterations: u32,
    /// Final residual (function value at root).
    pub residual: f64,
}

/// Outcome of evaluating the objective at both bracket ends.
pub(crate) enum BracketStart {
    /// One endpoint already satisfies the tolerance.
    Root(SolverResult),
    /// Opposite signs at the endpoints.
    Straddled { a: f64, fa: f64, b: f64, fb: f64 },
}

/// Evaluates `f` at a point, rejecting non-finite values.
pub(crate) fn evaluate<F, E>(f: &mut F, x: f64) -> Result<f64, E>
where
    F: FnMut(f64) -> Result<f64, E>,
    E: From<MathError>,
{
    let fx = f(x)?;
    if fx.is_finite() {
        Ok(fx)
    } else {
        Err(MathError::invalid_input(format!("objective is not finite at x = {x}: {fx}")).into())
    }
}

/// Evaluates both endpoints and checks for a sign change.
pub(crate) fn start_bracket<F, E>(
    f: &mut F,
    bracket: Bracket,
    config: &SolverConfig,
) -> Result<BracketStart, E>
where
    F: FnMut(f64) -> Result<f64, E>,
    E: From<MathError>,
{
    let (a, b) = (bracket.lower(), bracket.upper());

    let fa = evaluate(f, a)?;
    if fa.abs() <= config.tolerance {
        return Ok(BracketStart::Root(SolverResult {
            root: a,
            iterations: 0,
            residual: fa,
        }));
    }

    let fb = evaluate(f, b)?;
    if fb.abs() <= config.tolerance {
        return Ok(BracketStart::Root(SolverResult {
            root: b,
            iterations: 0,
            residual: fb,
        }));
    }

    if fa.signum() == fb.signum() {
        return Err(MathError::InvalidBracket { a, b, fa, fb }.into());
    }

    Ok(BracketStart::Straddled { a, fa, b, fb })
}

/// True once `[a, b]` cannot be split further in floating point.
pub(crate) fn bracket_collapsed(a: f64, b: f64) -> bool {
    (b - a).abs() <= 4.0 * f64::EPSILON * a.abs().max(b.abs()).max(1.0)
}
