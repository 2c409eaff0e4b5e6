//! Local-control spline primitives.
//!
//! A curve is a chain of [`SegmentBasis`] values. Each segment is fitted on
//! its own by a [`SegmentFitter`] from:
//!
//! - the value and derivatives inherited from the segment on its left,
//! - the node value at its right edge,
//! - any [`ResponseConstraint`] lying inside it,
//!
//! with a roughness penalty resolving whatever freedom remains. Because no
//! segment looks to its right, changing a node only refits the segments from
//! that node onwards.

mod basis;
mod constraint;
mod fitter;

pub use basis::{BasisFamily, SegmentBasis};
pub use constraint::{ConstraintTerm, ResponseConstraint, SegmentConstraintSet};
pub use fitter::{FitterConfig, LeftBoundary, SegmentFitter, DEFAULT_MAX_CONDITION_NUMBER};
