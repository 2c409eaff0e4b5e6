//! Integration tests: calibrate curves end to end and check the audit trail.
//!
//! Covers the sequential bootstrap, repricing, sensitivities through the
//! latent state view, shape control, cancellation, persistence and a
//! dependent curve calibrated on top of a discount curve.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Once};
use std::time::Duration;

use approx::assert_relative_eq;
use knotwork_curves::prelude::*;
use knotwork_math::spline::{BasisFamily, ResponseConstraint};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// TEST DATA
// =============================================================================

fn points(pairs: &[(f64, f64)]) -> CalibrationSet {
    CalibrationSet::new(
        pairs
            .iter()
            .map(|&(t, q)| {
                Arc::new(PointQuote::new(t, q).unwrap()) as Arc<dyn CalibrationInstrument>
            })
            .collect(),
    )
    .unwrap()
}

fn three_point_set() -> CalibrationSet {
    points(&[(1.0, 0.01), (2.0, 0.015), (5.0, 0.02)])
}

fn five_point_set() -> CalibrationSet {
    points(&[
        (1.0, 0.010),
        (2.0, 0.015),
        (3.0, 0.017),
        (5.0, 0.020),
        (10.0, 0.024),
    ])
}

fn calibrate(config: CalibrationConfig, set: &CalibrationSet) -> (Bootstrapper, CalibratedCurve) {
    init_tracing();
    let bootstrapper = Bootstrapper::new(config).unwrap();
    let curve = bootstrapper.calibrate(set, &CalibrationContext::new()).unwrap();
    (bootstrapper, curve)
}

fn grid(from: f64, to: f64, count: usize) -> Vec<f64> {
    (0..=count)
        .map(|i| from + (to - from) * i as f64 / count as f64)
        .collect()
}

// =============================================================================
// BOOTSTRAP
// =============================================================================

#[test]
fn test_three_instrument_scenario() {
    let config = CalibrationConfig::default()
        .with_continuity_order(1)
        .with_roughness_penalty_order(2);
    let (_, curve) = calibrate(config, &three_point_set());
    let regime = curve.regime();

    assert_eq!(regime.knots(), &[1.0, 2.0, 5.0]);
    assert_relative_eq!(regime.node_value(0).unwrap(), 0.01, epsilon = 1e-10);
    assert_relative_eq!(regime.node_value(1).unwrap(), 0.015, epsilon = 1e-10);
    assert_relative_eq!(regime.node_value(2).unwrap(), 0.02, epsilon = 1e-10);

    let at_3 = regime.evaluate(3.0).unwrap();
    assert!(at_3 > regime.evaluate(2.0).unwrap());
    assert!(at_3 < regime.evaluate(5.0).unwrap());

    assert!(curve.is_valid());
    assert_eq!(curve.steps().len(), 3);
}

#[test]
fn test_duplicate_maturity_rejected_before_solving() {
    let instruments: Vec<Arc<dyn CalibrationInstrument>> = vec![
        Arc::new(PointQuote::new(1.0, 0.01).unwrap()),
        Arc::new(PointQuote::new(2.0, 0.015).unwrap()),
        Arc::new(PointQuote::new(2.0, 0.02).unwrap()),
    ];
    let err = CalibrationSet::new(instruments).unwrap_err();
    assert!(matches!(
        err,
        CurveError::InstrumentOrderingViolation { index: 2, .. }
    ));
    assert_eq!(err.instrument_index(), Some(2));
}

#[test]
fn test_unreachable_quote_is_not_bracketed() {
    init_tracing();
    let set = points(&[(1.0, 0.01), (2.0, 1e6)]);
    let bootstrapper = Bootstrapper::new(CalibrationConfig::default()).unwrap();
    let err = bootstrapper
        .calibrate(&set, &CalibrationContext::new())
        .unwrap_err();
    match err {
        CurveError::RootNotBracketed {
            instrument_index, ..
        } => assert_eq!(instrument_index, 1),
        other => panic!("expected RootNotBracketed, got {other:?}"),
    }
}

#[test]
fn test_penalty_blind_to_cubic_is_underdetermined() {
    init_tracing();
    let config = CalibrationConfig::default().with_roughness_penalty_order(4);
    let bootstrapper = Bootstrapper::new(config).unwrap();
    let err = bootstrapper
        .calibrate(&three_point_set(), &CalibrationContext::new())
        .unwrap_err();
    assert_eq!(err.segment_index(), Some(0));
    assert_eq!(err.category(), ErrorCategory::Configuration);
    match err {
        CurveError::UnderdeterminedSegment {
            segment_index,
            independent,
            unknowns,
        } => {
            assert_eq!(segment_index, 0);
            assert_eq!((independent, unknowns), (2, 4));
        }
        other => panic!("expected UnderdeterminedSegment, got {other:?}"),
    }
}

#[test]
fn test_dependent_constraints_are_ill_conditioned() {
    init_tracing();
    let pinned = ResponseConstraint::value_at(3.5, 0.018).unwrap();
    let config = CalibrationConfig::default()
        .with_constraint(pinned.clone())
        .with_constraint(pinned);
    let bootstrapper = Bootstrapper::new(config).unwrap();
    let err = bootstrapper
        .calibrate(&three_point_set(), &CalibrationContext::new())
        .unwrap_err();
    // The pair lands in [2, 5], the second segment.
    assert_eq!(err.segment_index(), Some(1));
    assert_eq!(err.category(), ErrorCategory::Numerical);
    match err {
        CurveError::IllConditionedSegment {
            segment_index,
            condition_number,
        } => {
            assert_eq!(segment_index, 1);
            assert!(condition_number > 1e12, "condition number {condition_number}");
        }
        other => panic!("expected IllConditionedSegment, got {other:?}"),
    }
}

#[test]
fn test_round_trip_repricing() {
    let set = points(&[
        (0.5, 0.031),
        (1.0, 0.034),
        (2.0, 0.036),
        (5.0, 0.041),
        (10.0, 0.045),
        (30.0, 0.047),
    ]);
    let (_, curve) = calibrate(CalibrationConfig::default(), &set);
    let report = reprice(&set, curve.regime(), 1e-9).unwrap();
    assert!(report.is_valid(), "{report}");
    assert!(report.max_error() < 1e-9);
    assert_eq!(report.total_count(), 6);
}

#[test]
fn test_continuity_at_knots() {
    let (_, curve) = calibrate(CalibrationConfig::default(), &five_point_set());
    let regime = curve.regime();
    let segments = regime.segments();
    for (k, pair) in segments.windows(2).enumerate() {
        let knot = regime.knots()[k + 1];
        for order in 0..=1 {
            let left = pair[0].derivative(knot, order);
            let right = pair[1].derivative(knot, order);
            assert_relative_eq!(left, right, epsilon = 1e-9, max_relative = 1e-8);
        }
    }
}

#[test]
fn test_average_quotes_on_anchored_forward_curve() {
    let instruments: Vec<Arc<dyn CalibrationInstrument>> = vec![
        Arc::new(AverageQuote::new(0.0, 1.0, 0.020).unwrap()),
        Arc::new(AverageQuote::new(1.0, 2.0, 0.024).unwrap()),
        Arc::new(AverageQuote::new(2.0, 5.0, 0.027).unwrap()),
    ];
    let set = CalibrationSet::new(instruments).unwrap();
    let config = CalibrationConfig::default().with_anchor(0.0, 0.018);
    let (_, curve) = calibrate(config, &set);

    assert_eq!(curve.regime().knots(), &[0.0, 1.0, 2.0, 5.0]);
    assert_eq!(curve.regime().node_value(0).unwrap(), 0.018);
    let regime = curve.regime();
    assert_relative_eq!(regime.integrate(1.0, 2.0).unwrap(), 0.024, epsilon = 1e-10);
    assert!(curve.is_valid());
}

#[test]
fn test_bond_curve_from_cash_flow_strips() {
    let instruments: Vec<Arc<dyn CalibrationInstrument>> = [1.0, 2.0, 3.0, 5.0, 7.0, 10.0]
        .iter()
        .map(|&t| {
            Arc::new(CashflowStrip::bullet(t, 0.04, 2, 1.0).unwrap())
                as Arc<dyn CalibrationInstrument>
        })
        .collect();
    let set = CalibrationSet::new(instruments).unwrap();
    let config = CalibrationConfig::default().with_anchor(0.0, 0.04);
    let (_, curve) = calibrate(config, &set);

    assert!(curve.is_valid(), "{}", curve.report());
    for &zero in &curve.regime().nodes()[1..] {
        assert!(zero > 0.035 && zero < 0.045, "zero rate {zero}");
    }
}

#[test]
fn test_config_loaded_from_toml_calibrates() {
    let config = CalibrationConfig::from_toml_str(
        r#"
        [segment.basis]
        kind = "hyperbolic_tension"
        tension = 2.0

        [solver]
        method = "bisection"
        tolerance = 1e-13
        max_iterations = 200
        "#,
    )
    .unwrap();
    let (_, curve) = calibrate(config, &three_point_set());
    assert!(curve.is_valid());
    assert_relative_eq!(curve.regime().evaluate(2.0).unwrap(), 0.015, epsilon = 1e-10);
}

// =============================================================================
// LATENT STATE
// =============================================================================

#[test]
fn test_zero_parallel_shift_is_idempotent() {
    let (bootstrapper, curve) = calibrate(CalibrationConfig::default(), &five_point_set());
    let view = LatentStateView::new(&bootstrapper, &curve);
    let shifted = view.parallel_shift_manifest_measure(0.0).unwrap();

    for x in grid(0.0, 12.0, 120) {
        assert_relative_eq!(
            shifted.evaluate(x).unwrap(),
            curve.regime().evaluate(x).unwrap(),
            epsilon = 1e-12
        );
    }
}

#[test]
fn test_quote_shift_is_local() {
    let set = five_point_set();
    let (bootstrapper, curve) = calibrate(CalibrationConfig::default(), &set);
    let view = LatentStateView::new(&bootstrapper, &curve);
    let shifted = view.shift_manifest_measure(2, 1e-4).unwrap();

    // Instrument 2 owns the segment [2, 3]; everything up to its left edge is fixed.
    let left_edge = set.maturities()[1];
    let knot = set.maturities()[2];
    for x in grid(0.0, left_edge, 60) {
        assert_eq!(
            shifted.evaluate(x).unwrap(),
            curve.regime().evaluate(x).unwrap(),
            "moved at {x}"
        );
    }
    assert_relative_eq!(shifted.evaluate(knot).unwrap(), 0.017 + 1e-4, epsilon = 1e-10);
}

#[test]
fn test_parallel_quote_shift_moves_every_node() {
    let (bootstrapper, curve) = calibrate(CalibrationConfig::default(), &five_point_set());
    let view = LatentStateView::new(&bootstrapper, &curve);
    let shifted = view.parallel_shift_manifest_measure(5e-4).unwrap();

    for (base, bumped) in curve.regime().nodes().iter().zip(shifted.nodes()) {
        assert_relative_eq!(bumped - base, 5e-4, epsilon = 1e-10);
    }
}

#[test]
fn test_node_shift_keeps_knots() {
    let (bootstrapper, curve) = calibrate(CalibrationConfig::default(), &five_point_set());
    let view = LatentStateView::new(&bootstrapper, &curve);
    let tweak = TweakSpec::new(
        "steepener",
        TweakMode::Absolute,
        1e-3,
        TweakWeights::PerNode(vec![-1.0, -0.5, 0.0, 0.5, 1.0]),
    )
    .unwrap();
    let shifted = view.custom_tweak_quantification_metric(&tweak).unwrap();

    assert_eq!(shifted.knots(), curve.regime().knots());
    assert_relative_eq!(
        shifted.node_value(4).unwrap() - curve.regime().node_value(4).unwrap(),
        1e-3,
        epsilon = 1e-14
    );
    assert_relative_eq!(
        shifted.node_value(2).unwrap(),
        curve.regime().node_value(2).unwrap()
    );
}

// =============================================================================
// SHAPE CONTROL
// =============================================================================

#[test]
fn test_monotone_filter_on_increasing_quotes() {
    // Steep front end followed by a plateau: the raw spline overshoots.
    let set = points(&[
        (1.0, 0.010),
        (2.0, 0.030),
        (3.0, 0.031),
        (4.0, 0.0315),
        (6.0, 0.032),
    ]);
    let config = CalibrationConfig::default().with_shape(ShapeSettings::monotone());
    let (_, curve) = calibrate(config, &set);
    let regime = curve.regime();

    let xs = grid(1.0, 6.0, 500);
    for pair in xs.windows(2) {
        let (a, b) = (regime.evaluate(pair[0]).unwrap(), regime.evaluate(pair[1]).unwrap());
        assert!(b >= a - 1e-11, "decreasing between {} and {}", pair[0], pair[1]);
    }
    for (k, &knot) in regime.knots().iter().enumerate() {
        assert_relative_eq!(regime.evaluate(knot).unwrap(), set.quotes()[k], epsilon = 1e-10);
    }
    assert!(curve.is_valid());
}

#[test]
fn test_shape_passes_keep_configured_basis() {
    let tension = BasisFamily::hyperbolic_tension(2.0).unwrap();
    let set = five_point_set();
    for shape in [
        ShapeSettings::monotone(),
        ShapeSettings::default().with_c1_generator(C1Generator::Bessel),
        ShapeSettings::default().with_extrema_elimination(true),
    ] {
        let config = CalibrationConfig::default().with_basis(tension).with_shape(shape);
        let (_, curve) = calibrate(config, &set);
        let families: Vec<_> = curve.regime().segments().iter().map(|s| s.family()).collect();
        assert!(families.iter().all(|&f| f == tension), "{shape:?}: {families:?}");
        assert!(curve.is_valid(), "{}", curve.report());
    }
}

#[test]
fn test_shape_with_c2_segments_conflicts() {
    init_tracing();
    let config = CalibrationConfig::default()
        .with_continuity_order(2)
        .with_shape(ShapeSettings::default().with_c1_generator(C1Generator::Bessel));
    let bootstrapper = Bootstrapper::new(config).unwrap();
    let err = bootstrapper
        .calibrate(&five_point_set(), &CalibrationContext::new())
        .unwrap_err();
    assert!(matches!(err, CurveError::ShapeConstraintConflict { .. }));
}

// =============================================================================
// CANCELLATION
// =============================================================================

#[test]
fn test_cancel_flag_stops_calibration() {
    init_tracing();
    let bootstrapper = Bootstrapper::new(CalibrationConfig::default()).unwrap();
    let flag = Arc::new(AtomicBool::new(true));
    let ctx = CalibrationContext::new().with_cancel_flag(flag);

    let err = bootstrapper.calibrate(&five_point_set(), &ctx).unwrap_err();
    assert_eq!(
        err,
        CurveError::Cancelled {
            instrument_index: 0,
            calibrated_prefix: vec![],
        }
    );
}

#[test]
fn test_expired_deadline_stops_calibration() {
    init_tracing();
    let bootstrapper =
        Bootstrapper::new(CalibrationConfig::default().with_anchor(0.0, 0.005)).unwrap();
    let ctx = CalibrationContext::new().with_timeout(Duration::ZERO);

    match bootstrapper.calibrate(&five_point_set(), &ctx) {
        Err(CurveError::Cancelled {
            instrument_index,
            calibrated_prefix,
        }) => {
            assert_eq!(instrument_index, 0);
            assert_eq!(calibrated_prefix, vec![(0.0, 0.005)]);
        }
        other => panic!("expected Cancelled, got {other:?}"),
    }
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[test]
fn test_snapshot_json_round_trip() {
    let config = CalibrationConfig::default().with_shape(ShapeSettings::monotone());
    let (_, curve) = calibrate(config, &five_point_set());
    let json = serde_json::to_string(&curve.regime().snapshot()).unwrap();
    let snapshot: RegimeSnapshot = serde_json::from_str(&json).unwrap();
    let restored = Regime::from_snapshot(snapshot).unwrap();

    assert_eq!(restored.shape_settings(), ShapeSettings::monotone());
    for x in grid(0.0, 12.0, 97) {
        assert_relative_eq!(
            restored.evaluate(x).unwrap(),
            curve.regime().evaluate(x).unwrap(),
            epsilon = 1e-15
        );
    }
}

// =============================================================================
// DEPENDENT CURVES
// =============================================================================

/// Zero-recovery risky zero coupon bond: discounting times survival.
#[derive(Debug)]
struct RiskyZero {
    discount: Arc<Regime>,
    maturity: f64,
    price: f64,
}

impl CalibrationInstrument for RiskyZero {
    fn maturity(&self) -> f64 {
        self.maturity
    }

    fn target_quote(&self) -> f64 {
        self.price
    }

    fn fair_value(&self, hazard: &dyn Curve) -> CurveResult<f64> {
        let df = (-self.discount.evaluate(self.maturity)? * self.maturity).exp();
        let survival = (-hazard.integrate(0.0, self.maturity)?).exp();
        Ok(df * survival)
    }

    fn description(&self) -> String {
        format!("RiskyZero {}", self.maturity)
    }
}

#[test]
fn test_hazard_curve_on_discount_curve() {
    let (_, discount) = calibrate(CalibrationConfig::default(), &three_point_set());
    let discount = Arc::new(discount.into_regime());

    let hazard_rate = 0.02;
    let instruments: Vec<Arc<dyn CalibrationInstrument>> = [1.0, 2.0, 5.0]
        .iter()
        .map(|&t| {
            let df = (-discount.evaluate(t).unwrap() * t).exp();
            Arc::new(RiskyZero {
                discount: Arc::clone(&discount),
                maturity: t,
                price: df * (-hazard_rate * t).exp(),
            }) as Arc<dyn CalibrationInstrument>
        })
        .collect();
    let set = CalibrationSet::new(instruments).unwrap();

    let config = CalibrationConfig::default()
        .with_anchor(0.0, hazard_rate)
        .with_bracket(knotwork_math::solvers::Bracket::new(0.0, 1.0).unwrap());
    let (_, hazard) = calibrate(config, &set);

    assert!(hazard.is_valid(), "{}", hazard.report());
    for &h in hazard.regime().nodes() {
        assert_relative_eq!(h, hazard_rate, epsilon = 1e-9);
    }
}
