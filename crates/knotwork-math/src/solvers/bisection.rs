//! Bisection method.

use crate::error::MathError;
use crate::solvers::{
    bracket_collapsed, evaluate, start_bracket, Bracket, BracketStart, SolverConfig, SolverResult,
};

/// Bisection method for root finding.
///
/// A robust but slow method that repeatedly halves the bracket. Guaranteed
/// to converge if the function changes sign over the interval.
///
/// # Errors
///
/// - [`MathError::InvalidBracket`] if `f` has the same sign at both ends
/// - [`MathError::ConvergenceFailed`] if the iteration budget runs out
pub fn bisection<F, E>(mut f: F, bracket: Bracket, config: &SolverConfig) -> Result<SolverResult, E>
where
    F: FnMut(f64) -> Result<f64, E>,
    E: From<MathError>,
{
    let (mut a, mut fa, mut b, _fb) = match start_bracket(&mut f, bracket, config)? {
        BracketStart::Root(result) => return Ok(result),
        BracketStart::Straddled { a, fa, b, fb } => (a, fa, b, fb),
    };

    let mut residual = fa.abs();
    for iteration in 1..=config.max_iterations {
        let mid = 0.5 * (a + b);
        let f_mid = evaluate(&mut f, mid)?;
        residual = f_mid.abs();

        if residual <= config.tolerance {
            return Ok(SolverResult {
                root: mid,
                iterations: iteration,
                residual: f_mid,
            });
        }

        if f_mid.signum() == fa.signum() {
            a = mid;
            fa = f_mid;
        } else {
            b = mid;
        }

        if bracket_collapsed(a, b) {
            return Err(MathError::convergence_failed(iteration, residual).into());
        }
    }

    Err(MathError::convergence_failed(config.max_iterations, residual).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sqrt_2() {
        let f = |x: f64| Ok::<_, MathError>(x * x - 2.0);
        let result = bisection(f, Bracket::new(0.0, 2.0).unwrap(), &SolverConfig::default()).unwrap();
        assert_relative_eq!(result.root, std::f64::consts::SQRT_2, epsilon = 1e-10);
    }

    #[test]
    fn test_endpoint_root() {
        let f = |x: f64| Ok::<_, MathError>(x - 1.0);
        let result = bisection(f, Bracket::new(1.0, 3.0).unwrap(), &SolverConfig::default()).unwrap();
        assert_eq!(result.root, 1.0);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_budget_exhaustion() {
        let f = |x: f64| Ok::<_, MathError>(x * x - 2.0);
        let config = SolverConfig::new(1e-14, 5);
        let err = bisection(f, Bracket::new(0.0, 2.0).unwrap(), &config).unwrap_err();
        assert!(matches!(err, MathError::ConvergenceFailed { iterations: 5, .. }));
    }
}
