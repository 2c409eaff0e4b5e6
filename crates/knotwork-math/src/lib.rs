//! # Knotwork Math
//!
//! Numerical building blocks for the Knotwork curve calibration engine.
//!
//! This crate provides:
//!
//! - **Guards**: Finite/ordering checks applied to every raw input
//! - **Solvers**: Bracketed root finders (guarded secant, Brent, bisection)
//! - **Linear Algebra**: Constrained least-norm solves for segment fitting
//! - **Quadrature**: Gauss-Legendre integration on finite intervals
//! - **Spline**: Segment bases, constraint sets and the segment fitter
//!
//! ## Design Philosophy
//!
//! - **Local systems**: Each segment is fitted from its own small system
//! - **Exact constraints**: Smoothness never trades off against calibration
//! - **Typed failures**: Singular and under-determined fits are distinct errors

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::similar_names)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::float_cmp)]

pub mod error;
pub mod guard;
pub mod linear_algebra;
pub mod quadrature;
pub mod solvers;
pub mod spline;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{MathError, MathResult};
    pub use crate::solvers::{
        bisection, brent, find_root, guarded_secant, Bracket, RootMethod, SolverConfig,
        SolverResult,
    };
    pub use crate::spline::{
        BasisFamily, ConstraintTerm, FitterConfig, LeftBoundary, ResponseConstraint,
        SegmentBasis, SegmentConstraintSet, SegmentFitter,
    };
}

pub use error::{MathError, MathResult};
