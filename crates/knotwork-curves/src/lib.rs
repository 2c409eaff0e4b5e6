//! # Knotwork Curves
//!
//! Curve bootstrapping and local-control spline calibration.
//!
//! This crate provides:
//!
//! - **Regime**: Ordered chain of fitted segments over strictly increasing knots
//! - **Bootstrap**: Sequential node-by-node calibration to a set of instruments
//! - **Shape Control**: C1 slope generators, monotone filter, extrema elimination
//! - **Latent State**: Quote and node shifts producing new curves
//! - **Repricing**: Audit report of every calibration
//! - **Instruments**: Reference probes (point, average, cash flow strip)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use knotwork_curves::prelude::*;
//!
//! let set = CalibrationSet::new(vec![
//!     Arc::new(PointQuote::new(1.0, 0.010)?) as Arc<dyn CalibrationInstrument>,
//!     Arc::new(PointQuote::new(2.0, 0.015)?),
//!     Arc::new(PointQuote::new(5.0, 0.020)?),
//! ])?;
//!
//! let bootstrapper = Bootstrapper::new(CalibrationConfig::default())?;
//! let curve = bootstrapper.calibrate(&set, &CalibrationContext::new())?;
//!
//! let value = curve.regime().evaluate(3.0)?;
//!
//! // Sensitivity to the 2Y quote
//! let view = LatentStateView::new(&bootstrapper, &curve);
//! let bumped = view.shift_manifest_measure(1, 0.0001)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::float_cmp)]

pub mod batch;
pub mod bootstrap;
pub mod calibration;
pub mod config;
pub mod error;
pub mod instruments;
pub mod latent;
pub mod regime;
pub mod repricing;
pub mod shape;
pub mod traits;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::batch::calibrate_independent;
    pub use crate::bootstrap::{Bootstrapper, CalibratedCurve, StepDiagnostics};
    pub use crate::calibration::{CalibrationContext, CalibrationSet};
    pub use crate::config::{
        Anchor, CalibrationConfig, SegmentSettings, SolverSettings, Validate, ValidationError,
    };
    pub use crate::error::{CurveError, CurveResult, ErrorCategory};
    pub use crate::instruments::{AverageQuote, CashflowStrip, PointQuote};
    pub use crate::latent::{LatentStateView, TweakMode, TweakSpec, TweakWeights};
    pub use crate::regime::{Extrapolation, Regime, RegimeSnapshot};
    pub use crate::repricing::{reprice, RepricingCheck, RepricingReport};
    pub use crate::shape::{C1Generator, ShapeController, ShapeSettings};
    pub use crate::traits::{CalibrationInstrument, Curve};
}

pub use bootstrap::{Bootstrapper, CalibratedCurve};
pub use error::{CurveError, CurveResult};
pub use regime::Regime;
pub use traits::{CalibrationInstrument, Curve};
