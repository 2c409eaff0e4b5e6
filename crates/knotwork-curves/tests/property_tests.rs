//! Property-based tests for calibration invariants.
//!
//! For random increasing maturities and quotes:
//! - Every instrument reprices
//! - Value and slope are continuous at interior knots
//! - The monotone filter keeps non-decreasing data non-decreasing
//! - A zero parallel shift reproduces the curve, with and without shaping
//! - A quote shift leaves the curve left of its knot fixed, up to the reach
//!   of the shape passes' slope stencils

use std::sync::Arc;

use knotwork_curves::prelude::*;
use proptest::prelude::*;

// =============================================================================
// STRATEGIES
// =============================================================================

/// Maturity gaps and quote increments, paired.
fn increments() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((0.25_f64..3.0, 0.0_f64..0.01), 2..8)
}

/// Quote changes of either sign.
fn signed_increments() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((0.25_f64..3.0, -0.01_f64..0.01), 2..8)
}

/// At least three quotes, so a shifted knot can have two knots before it.
fn longer_signed_increments() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((0.25_f64..3.0, -0.01_f64..0.01), 3..8)
}

fn shaped_config() -> CalibrationConfig {
    CalibrationConfig::default()
        .with_shape(ShapeSettings::monotone().with_c1_generator(C1Generator::Bessel))
}

fn build_set(steps: &[(f64, f64)], start: f64) -> CalibrationSet {
    let mut maturity = 0.0;
    let mut quote = start;
    let instruments = steps
        .iter()
        .map(|&(gap, change)| {
            maturity += gap;
            quote += change;
            Arc::new(PointQuote::new(maturity, quote).unwrap()) as Arc<dyn CalibrationInstrument>
        })
        .collect();
    CalibrationSet::new(instruments).unwrap()
}

fn calibrate(config: CalibrationConfig, set: &CalibrationSet) -> (Bootstrapper, CalibratedCurve) {
    let bootstrapper = Bootstrapper::new(config).unwrap();
    let curve = bootstrapper.calibrate(set, &CalibrationContext::new()).unwrap();
    (bootstrapper, curve)
}

fn close(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol * (1.0 + a.abs().max(b.abs()))
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_every_instrument_reprices(steps in signed_increments()) {
        let set = build_set(&steps, 0.03);
        let (_, curve) = calibrate(CalibrationConfig::default(), &set);
        prop_assert!(curve.is_valid(), "{}", curve.report());
        for (k, &quote) in set.quotes().iter().enumerate() {
            prop_assert!(close(curve.regime().node_value(k).unwrap(), quote, 1e-10));
        }
    }

    #[test]
    fn prop_c1_continuity_at_knots(steps in signed_increments()) {
        let set = build_set(&steps, 0.03);
        let (_, curve) = calibrate(CalibrationConfig::default(), &set);
        let regime = curve.regime();
        for (k, pair) in regime.segments().windows(2).enumerate() {
            let knot = regime.knots()[k + 1];
            for order in 0..=1 {
                let left = pair[0].derivative(knot, order);
                let right = pair[1].derivative(knot, order);
                prop_assert!(
                    close(left, right, 1e-8),
                    "order {} mismatch at {}: {} vs {}", order, knot, left, right
                );
            }
        }
    }

    #[test]
    fn prop_monotone_filter_preserves_order(steps in increments()) {
        let set = build_set(&steps, 0.01);
        let config = CalibrationConfig::default().with_shape(ShapeSettings::monotone());
        let (_, curve) = calibrate(config, &set);
        let regime = curve.regime();
        let (first, last) = regime.domain().unwrap();

        let mut previous = regime.evaluate(first).unwrap();
        for i in 1..=400 {
            let x = first + (last - first) * f64::from(i) / 400.0;
            let value = regime.evaluate(x).unwrap();
            prop_assert!(value >= previous - 1e-11, "decreasing at {}: {} < {}", x, value, previous);
            previous = value;
        }
    }

    #[test]
    fn prop_zero_parallel_shift_is_identity(steps in signed_increments()) {
        let set = build_set(&steps, 0.03);
        let (bootstrapper, curve) = calibrate(CalibrationConfig::default(), &set);
        let view = LatentStateView::new(&bootstrapper, &curve);
        let shifted = view.parallel_shift_manifest_measure(0.0).unwrap();
        let (first, last) = curve.regime().domain().unwrap();
        for i in 0..=50 {
            let x = first + (last - first) * f64::from(i) / 50.0;
            prop_assert!(close(
                shifted.evaluate(x).unwrap(),
                curve.regime().evaluate(x).unwrap(),
                1e-12
            ));
        }
    }

    #[test]
    fn prop_zero_parallel_shift_is_identity_when_shaped(steps in signed_increments()) {
        let set = build_set(&steps, 0.03);
        let (bootstrapper, curve) = calibrate(shaped_config(), &set);
        let view = LatentStateView::new(&bootstrapper, &curve);
        let shifted = view.parallel_shift_manifest_measure(0.0).unwrap();
        prop_assert_eq!(shifted.shape_settings(), curve.regime().shape_settings());
        let (first, last) = curve.regime().domain().unwrap();
        for i in 0..=50 {
            let x = first + (last - first) * f64::from(i) / 50.0;
            prop_assert!(close(
                shifted.evaluate(x).unwrap(),
                curve.regime().evaluate(x).unwrap(),
                1e-12
            ));
        }
    }

    #[test]
    fn prop_quote_shift_is_local(
        steps in longer_signed_increments(),
        pick in any::<prop::sample::Index>(),
    ) {
        let set = build_set(&steps, 0.03);
        let (bootstrapper, curve) = calibrate(CalibrationConfig::default(), &set);
        let index = 1 + pick.index(set.len() - 1);
        let shifted = LatentStateView::new(&bootstrapper, &curve)
            .shift_manifest_measure(index, 1e-4)
            .unwrap();

        let (first, _) = curve.regime().domain().unwrap();
        let edge = set.maturities()[index - 1];
        for i in 0..=40 {
            let x = first + (edge - first) * f64::from(i) / 40.0;
            prop_assert!(close(
                shifted.evaluate(x).unwrap(),
                curve.regime().evaluate(x).unwrap(),
                1e-13
            ), "moved at {}", x);
        }
    }

    #[test]
    fn prop_quote_shift_is_local_when_shaped(
        steps in longer_signed_increments(),
        pick in any::<prop::sample::Index>(),
    ) {
        let set = build_set(&steps, 0.03);
        let (bootstrapper, curve) = calibrate(shaped_config(), &set);
        let index = 2 + pick.index(set.len() - 2);
        let shifted = LatentStateView::new(&bootstrapper, &curve)
            .shift_manifest_measure(index, 1e-4)
            .unwrap();

        // Knot slopes at `index - 1` read the moved secant; two knots back is fixed.
        let (first, _) = curve.regime().domain().unwrap();
        let edge = set.maturities()[index - 2];
        for i in 0..=40 {
            let x = first + (edge - first) * f64::from(i) / 40.0;
            prop_assert!(close(
                shifted.evaluate(x).unwrap(),
                curve.regime().evaluate(x).unwrap(),
                1e-13
            ), "moved at {}", x);
        }
        prop_assert!(close(shifted.node_value(index).unwrap(), set.quotes()[index] + 1e-4, 1e-10));
    }
}
