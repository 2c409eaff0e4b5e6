//! Brent's root-finding algorithm.

use crate::error::MathError;
use crate::solvers::{
    bracket_collapsed, evaluate, start_bracket, Bracket, BracketStart, SolverConfig, SolverResult,
};

/// Brent's root-finding algorithm.
///
/// Combines the reliability of bisection with the speed of the secant method
/// and inverse quadratic interpolation.
///
/// # Example
///
/// ```rust
/// use knotwork_math::solvers::{brent, Bracket, SolverConfig};
/// use knotwork_math::MathError;
///
/// let f = |x: f64| Ok::<_, MathError>(x * x * x - x - 2.0);
/// let result = brent(f, Bracket::new(1.0, 2.0).unwrap(), &SolverConfig::default()).unwrap();
/// assert!(result.residual.abs() < 1e-10);
/// ```
pub fn brent<F, E>(mut f: F, bracket: Bracket, config: &SolverConfig) -> Result<SolverResult, E>
where
    F: FnMut(f64) -> Result<f64, E>,
    E: From<MathError>,
{
    let (mut a, mut fa, mut b, mut fb) = match start_bracket(&mut f, bracket, config)? {
        BracketStart::Root(result) => return Ok(result),
        BracketStart::Straddled { a, fa, b, fb } => (a, fa, b, fb),
    };

    // Ensure |f(a)| >= |f(b)|
    if fa.abs() < fb.abs() {
        std::mem::swap(&mut a, &mut b);
        std::mem::swap(&mut fa, &mut fb);
    }

    let mut c = a;
    let mut fc = fa;
    let mut d = b - a;
    let mut e = d;

    for iteration in 1..=config.max_iterations {
        let mut use_bisection = true;
        let mut s = 0.0;
        let m = 0.5 * (a + b);

        if (fa - fc).abs() > 1e-300 && (fb - fc).abs() > 1e-300 {
            // Inverse quadratic interpolation
            let r = fb / fc;
            let p_val = fa / fc;
            let q = fa / fb;
            s = b
                - (q * (q - r) * (b - a) + (1.0 - r) * (b - c) * p_val)
                    / ((q - 1.0) * (r - 1.0) * (p_val - 1.0));
        } else if (fb - fa).abs() > 1e-300 {
            // Secant method
            s = b - fb * (b - a) / (fb - fa);
        }

        if s.is_finite() && s > m.min(b) && s < m.max(b) && (s - b).abs() < e.abs() / 2.0 {
            use_bisection = false;
        }

        if use_bisection {
            s = m;
            e = b - a;
            d = e;
        } else {
            e = d;
            d = s - b;
        }

        c = b;
        fc = fb;

        let fs = evaluate(&mut f, s)?;
        log::trace!("brent iter {iteration}: x = {s:.15e}, f = {fs:.3e}");

        if fs.abs() <= config.tolerance {
            return Ok(SolverResult {
                root: s,
                iterations: iteration,
                residual: fs,
            });
        }

        if fa * fs < 0.0 {
            b = s;
            fb = fs;
        } else {
            a = s;
            fa = fs;
        }

        // Ensure |f(a)| >= |f(b)|
        if fa.abs() < fb.abs() {
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut fa, &mut fb);
        }

        if bracket_collapsed(a, b) {
            return Err(MathError::convergence_failed(iteration, fb.abs()).into());
        }
    }

    Err(MathError::convergence_failed(config.max_iterations, fb.abs()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sin() {
        let f = |x: f64| Ok::<_, MathError>(x.sin());
        let result = brent(f, Bracket::new(3.0, 4.0).unwrap(), &SolverConfig::default()).unwrap();
        assert_relative_eq!(result.root, std::f64::consts::PI, epsilon = 1e-10);
    }

    #[test]
    fn test_invalid_bracket() {
        let f = |x: f64| Ok::<_, MathError>(x * x - 2.0);
        let result = brent(f, Bracket::new(2.0, 3.0).unwrap(), &SolverConfig::default());
        assert!(matches!(result, Err(MathError::InvalidBracket { .. })));
    }

    #[test]
    fn test_faster_than_bisection() {
        let f = |x: f64| Ok::<_, MathError>(x * x - 2.0);
        let result = brent(f, Bracket::new(1.0, 2.0).unwrap(), &SolverConfig::default()).unwrap();
        // Bisection needs ~40 halvings for a 1e-12 residual
        assert!(result.iterations < 20);
    }
}
