//! Bisection-guarded secant iteration.

use crate::error::MathError;
use crate::solvers::{
    bracket_collapsed, evaluate, start_bracket, Bracket, BracketStart, SolverConfig, SolverResult,
};

/// Secant root finder that never leaves its bracket.
///
/// Each iteration proposes a secant step through the two most recent
/// iterates (regula falsi on the bracket for the first step). The proposal is
/// replaced by the bracket midpoint when it
///
/// 1. falls outside the current bracket or is not finite, or
/// 2. has failed to halve the bracket twice in a row.
///
/// The second rule bounds the worst case by bisection while keeping
/// superlinear convergence on smooth objectives.
///
/// # Arguments
///
/// * `f` - Fallible objective
/// * `bracket` - Interval with a sign change
/// * `initial_guess` - First interior point to try (ignored if outside)
/// * `config` - Solver configuration
///
/// # Errors
///
/// - [`MathError::InvalidBracket`] if `f` has the same sign at both ends
/// - [`MathError::ConvergenceFailed`] if the iteration budget runs out
/// - any error returned by `f`
pub fn guarded_secant<F, E>(
    mut f: F,
    bracket: Bracket,
    initial_guess: Option<f64>,
    config: &SolverConfig,
) -> Result<SolverResult, E>
where
    F: FnMut(f64) -> Result<f64, E>,
    E: From<MathError>,
{
    let (mut a, mut fa, mut b, mut fb) = match start_bracket(&mut f, bracket, config)? {
        BracketStart::Root(result) => return Ok(result),
        BracketStart::Straddled { a, fa, b, fb } => (a, fa, b, fb),
    };

    let mut x = match initial_guess {
        Some(guess) if bracket.contains(guess) => guess,
        _ => false_position(a, fa, b, fb),
    };
    let mut previous: Option<(f64, f64)> = None;
    let mut width = b - a;
    let mut slow_steps = 0;
    let mut last_residual = fa.abs().min(fb.abs());

    for iteration in 1..=config.max_iterations {
        let fx = evaluate(&mut f, x)?;
        last_residual = fx.abs();
        log::trace!("guarded secant iter {iteration}: x = {x:.15e}, f = {fx:.3e}");

        if fx.abs() <= config.tolerance {
            return Ok(SolverResult {
                root: x,
                iterations: iteration,
                residual: fx,
            });
        }

        if fx.signum() == fa.signum() {
            a = x;
            fa = fx;
        } else {
            b = x;
            fb = fx;
        }

        if bracket_collapsed(a, b) {
            return Err(MathError::convergence_failed(iteration, last_residual).into());
        }

        let new_width = b - a;
        if new_width > 0.5 * width {
            slow_steps += 1;
        } else {
            slow_steps = 0;
        }
        width = new_width;

        let proposal = match previous {
            Some((xp, fp)) if fx != fp => x - fx * (x - xp) / (fx - fp),
            _ => false_position(a, fa, b, fb),
        };

        previous = Some((x, fx));
        x = if slow_steps >= 2 || !(proposal.is_finite() && proposal > a && proposal < b) {
            slow_steps = 0;
            0.5 * (a + b)
        } else {
            proposal
        };
    }

    Err(MathError::convergence_failed(config.max_iterations, last_residual).into())
}

fn false_position(a: f64, fa: f64, b: f64, fb: f64) -> f64 {
    let x = b - fb * (b - a) / (fb - fa);
    if x.is_finite() && x > a && x < b {
        x
    } else {
        0.5 * (a + b)
    }
}
