//! Linear algebra utilities.
//!
//! Segment fits are small dense systems: a handful of exact linear
//! constraints on the basis coefficients plus a quadratic roughness penalty
//! that picks one solution out of whatever freedom the constraints leave.
//! [`solve_min_penalty`] handles both halves through an SVD of the
//! constraint matrix.

use crate::error::{MathError, MathResult};
use nalgebra::{DMatrix, DVector};

/// Output of [`solve_min_penalty`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConstrainedSolution {
    /// Solved coefficients.
    pub coefficients: Vec<f64>,
    /// Dimensions left free by the constraints and fixed by the penalty.
    pub free_dimensions: usize,
    /// Condition number of the constraint rows (largest over smallest
    /// singular value).
    pub condition_number: f64,
}

/// Solves `A c = b` exactly, choosing among all solutions the one that
/// minimises `cᵀ P c`.
///
/// # Arguments
///
/// * `a` - Constraint matrix (`r x n`)
/// * `b` - Constraint targets (length `r`)
/// * `penalty` - Symmetric positive semi-definite penalty (`n x n`)
/// * `max_condition_number` - Rank cut-off for both the constraint rows and
///   the reduced penalty
///
/// # Errors
///
/// - [`MathError::IllConditioned`] if the rows are dependent or their
///   condition number exceeds `max_condition_number`
/// - [`MathError::Underdetermined`] if the penalty does not fix every
///   direction the constraints leave free
/// - [`MathError::DimensionMismatch`] on inconsistent shapes
pub fn solve_min_penalty(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    penalty: &DMatrix<f64>,
    max_condition_number: f64,
) -> MathResult<ConstrainedSolution> {
    let rows = a.nrows();
    let n = a.ncols();

    if b.len() != rows {
        return Err(MathError::DimensionMismatch {
            expected: rows,
            actual: b.len(),
        });
    }
    if penalty.nrows() != n || penalty.ncols() != n {
        return Err(MathError::DimensionMismatch {
            expected: n,
            actual: penalty.nrows(),
        });
    }
    if n == 0 {
        return Err(MathError::invalid_input("system has no unknowns"));
    }

    // Pad to at least n rows so the SVD yields the full right singular basis.
    let m = rows.max(n);
    let mut padded = DMatrix::<f64>::zeros(m, n);
    let mut rhs = DVector::<f64>::zeros(m);
    for i in 0..rows {
        for j in 0..n {
            padded[(i, j)] = a[(i, j)];
        }
        rhs[i] = b[i];
    }

    let svd = padded
        .try_svd(true, true, f64::EPSILON, 0)
        .ok_or_else(|| MathError::ill_conditioned(f64::INFINITY))?;
    let (Some(u), Some(v_t)) = (svd.u.as_ref(), svd.v_t.as_ref()) else {
        return Err(MathError::ill_conditioned(f64::INFINITY));
    };
    let sigma = &svd.singular_values;

    let sigma_max = sigma.iter().copied().fold(0.0_f64, f64::max);
    let cutoff = sigma_max / max_condition_number;
    let retained: Vec<usize> = (0..n)
        .filter(|&i| sigma_max > 0.0 && sigma[i] > cutoff)
        .collect();

    if retained.len() < rows {
        let mut sorted: Vec<f64> = sigma.iter().copied().collect();
        sorted.sort_by(|x, y| y.total_cmp(x));
        let weakest = sorted.get(rows - 1).copied().unwrap_or(0.0);
        let condition_number = if weakest > 0.0 {
            sigma_max / weakest
        } else {
            f64::INFINITY
        };
        log::debug!(
            "constraint rows rank-deficient: {} of {rows} independent (cond {condition_number:.2e})",
            retained.len()
        );
        return Err(MathError::ill_conditioned(condition_number));
    }

    let condition_number = retained
        .iter()
        .map(|&i| sigma[i])
        .fold(f64::INFINITY, f64::min)
        .recip()
        * sigma_max;

    // Particular (minimum-norm) solution.
    let mut particular = DVector::<f64>::zeros(n);
    for &i in &retained {
        let mut projection = 0.0;
        for k in 0..m {
            projection += u[(k, i)] * rhs[k];
        }
        let scale = projection / sigma[i];
        for j in 0..n {
            particular[j] += scale * v_t[(i, j)];
        }
    }

    let free: Vec<usize> = (0..n).filter(|i| !retained.contains(i)).collect();
    if free.is_empty() {
        return Ok(ConstrainedSolution {
            coefficients: particular.iter().copied().collect(),
            free_dimensions: 0,
            condition_number,
        });
    }

    // Null space basis, one column per free direction.
    let mut z = DMatrix::<f64>::zeros(n, free.len());
    for (col, &i) in free.iter().enumerate() {
        for j in 0..n {
            z[(j, col)] = v_t[(i, j)];
        }
    }

    let zt = z.transpose();
    let reduced = &zt * penalty * &z;
    let reduced = (&reduced + reduced.transpose()) * 0.5;

    let eigen = reduced
        .clone()
        .try_symmetric_eigen(f64::EPSILON, 0)
        .ok_or_else(|| MathError::ill_conditioned(f64::INFINITY))?;
    let lambda_max = eigen.eigenvalues.iter().copied().fold(0.0_f64, f64::max);
    let lambda_cutoff = lambda_max / max_condition_number;
    let penalised = eigen
        .eigenvalues
        .iter()
        .filter(|&&l| lambda_max > 0.0 && l > lambda_cutoff)
        .count();

    let underdetermined = MathError::Underdetermined {
        independent: retained.len() + penalised,
        unknowns: n,
    };
    if penalised < free.len() {
        log::debug!(
            "penalty leaves {} of {} free directions unresolved",
            free.len() - penalised,
            free.len()
        );
        return Err(underdetermined);
    }

    let gradient = -(&zt * penalty * &particular);
    let cholesky = reduced.cholesky().ok_or(underdetermined)?;
    let step = cholesky.solve(&gradient);
    let solution = particular + &z * step;

    Ok(ConstrainedSolution {
        coefficients: solution.iter().copied().collect(),
        free_dimensions: free.len(),
        condition_number,
    })
}
