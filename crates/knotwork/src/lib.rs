//! # Knotwork
//!
//! Curve bootstrapping and local-control spline calibration.
//!
//! This crate re-exports the public API of [`knotwork_curves`] at the root
//! and the numerical building blocks of [`knotwork_math`] under [`math`].
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use knotwork::prelude::*;
//!
//! let set = CalibrationSet::new(vec![
//!     Arc::new(PointQuote::new(1.0, 0.010)?) as Arc<dyn CalibrationInstrument>,
//!     Arc::new(PointQuote::new(2.0, 0.015)?),
//! ])?;
//! let curve = Bootstrapper::new(CalibrationConfig::default())?
//!     .calibrate(&set, &CalibrationContext::new())?;
//! ```

#![warn(missing_docs)]

pub use knotwork_curves::*;

/// Root finders, segment bases and the segment fitter.
pub mod math {
    pub use knotwork_math::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use knotwork_curves::prelude::*;
    pub use knotwork_math::solvers::{Bracket, RootMethod};
    pub use knotwork_math::spline::{BasisFamily, ResponseConstraint};
}
