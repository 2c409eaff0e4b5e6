//! Finite-value and ordering guards.
//!
//! Every public constructor that accepts raw floats runs them through these
//! checks, so NaN or infinite inputs are rejected before they reach a fit.

use crate::error::{MathError, MathResult};

/// Returns `value` if it is finite.
pub fn ensure_finite(name: &str, value: f64) -> MathResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MathError::invalid_input(format!(
            "{name} must be finite, got {value}"
        )))
    }
}

/// Checks that every element of `values` is finite.
pub fn ensure_all_finite(name: &str, values: &[f64]) -> MathResult<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(MathError::invalid_input(format!(
            "{name}[{i}] must be finite, got {}",
            values[i]
        ))),
        None => Ok(()),
    }
}

/// Returns `value` if it is finite and strictly positive.
pub fn ensure_positive(name: &str, value: f64) -> MathResult<f64> {
    let value = ensure_finite(name, value)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(MathError::invalid_input(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

/// Checks that `values` are finite and strictly increasing.
pub fn ensure_strictly_increasing(name: &str, values: &[f64]) -> MathResult<()> {
    ensure_all_finite(name, values)?;
    for i in 1..values.len() {
        if values[i] <= values[i - 1] {
            return Err(MathError::invalid_input(format!(
                "{name} must be strictly increasing: [{}] = {} >= [{i}] = {}",
                i - 1,
                values[i - 1],
                values[i]
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_nan_and_infinity() {
        assert!(ensure_finite("x", f64::NAN).is_err());
        assert!(ensure_finite("x", f64::INFINITY).is_err());
        assert_eq!(ensure_finite("x", 1.5).unwrap(), 1.5);
    }

    #[test]
    fn test_all_finite_reports_index() {
        let err = ensure_all_finite("quotes", &[0.01, f64::NAN]).unwrap_err();
        assert!(err.to_string().contains("quotes[1]"));
    }

    #[test]
    fn test_positive() {
        assert!(ensure_positive("tension", 0.0).is_err());
        assert!(ensure_positive("tension", 2.0).is_ok());
    }

    #[test]
    fn test_strictly_increasing() {
        assert!(ensure_strictly_increasing("knots", &[1.0, 2.0, 5.0]).is_ok());
        assert!(ensure_strictly_increasing("knots", &[1.0, 1.0]).is_err());
        assert!(ensure_strictly_increasing("knots", &[2.0, 1.0]).is_err());
        assert!(ensure_strictly_increasing("knots", &[]).is_ok());
    }
}
