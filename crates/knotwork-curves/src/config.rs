//! Calibration configuration.
//!
//! [`CalibrationConfig`] gathers every knob of a calibration: the segment
//! basis and constraints, the root finder, the optional anchor node, the
//! extrapolation policy, the shape passes and the repricing tolerance. Every
//! field has a default, so a configuration file only needs to name what it
//! changes.
//!
//! ```toml
//! repricing_tolerance = 1e-10
//!
//! [segment]
//! continuity_order = 1
//! roughness_penalty_order = 2
//!
//! [segment.basis]
//! kind = "hyperbolic_tension"
//! tension = 1.5
//!
//! [solver]
//! method = "brent"
//!
//! [anchor]
//! knot = 0.0
//! value = 0.01
//! ```

use std::fmt;

use knotwork_math::solvers::{Bracket, RootMethod, SolverConfig};
use knotwork_math::spline::{
    BasisFamily, FitterConfig, ResponseConstraint, SegmentConstraintSet, SegmentFitter,
    DEFAULT_MAX_CONDITION_NUMBER,
};
use serde::{Deserialize, Serialize};

use crate::error::{CurveError, CurveResult};
use crate::regime::Extrapolation;
use crate::shape::ShapeSettings;

// =============================================================================
// SEGMENT SETTINGS
// =============================================================================

/// Basis, continuity, penalty and constraints shared by every segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSettings {
    /// Basis family of each segment.
    #[serde(default)]
    pub basis: BasisFamily,

    /// Derivatives of order `0..=continuity_order` match at interior knots.
    #[serde(default = "default_continuity_order")]
    pub continuity_order: usize,

    /// Derivative order of the roughness penalty.
    #[serde(default = "default_roughness_penalty_order")]
    pub roughness_penalty_order: usize,

    /// Interior response constraints.
    #[serde(default)]
    pub constraints: Vec<ResponseConstraint>,

    /// Condition number above which a segment fit is rejected.
    #[serde(default = "default_max_condition_number")]
    pub max_condition_number: f64,
}

fn default_continuity_order() -> usize {
    1
}

fn default_roughness_penalty_order() -> usize {
    2
}

fn default_max_condition_number() -> f64 {
    DEFAULT_MAX_CONDITION_NUMBER
}

impl Default for SegmentSettings {
    fn default() -> Self {
        Self {
            basis: BasisFamily::default(),
            continuity_order: default_continuity_order(),
            roughness_penalty_order: default_roughness_penalty_order(),
            constraints: Vec::new(),
            max_condition_number: default_max_condition_number(),
        }
    }
}

impl SegmentSettings {
    /// Builds the constraint set.
    pub fn constraint_set(&self) -> CurveResult<SegmentConstraintSet> {
        Ok(SegmentConstraintSet::new(
            self.continuity_order,
            self.roughness_penalty_order,
            self.constraints.clone(),
        )?)
    }

    /// Builds the segment fitter.
    pub fn fitter(&self) -> CurveResult<SegmentFitter> {
        Ok(SegmentFitter::new(
            self.basis,
            self.constraint_set()?,
            FitterConfig {
                max_condition_number: self.max_condition_number,
            },
        )?)
    }
}

// =============================================================================
// SOLVER SETTINGS
// =============================================================================

/// Root finder used for each node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Root-finding method.
    #[serde(default)]
    pub method: RootMethod,

    /// Convergence tolerance on the repricing residual.
    #[serde(default = "default_solver_tolerance")]
    pub tolerance: f64,

    /// Iteration cap per node.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Search interval for every node value.
    #[serde(default)]
    pub bracket: Bracket,
}

fn default_solver_tolerance() -> f64 {
    1e-12
}

fn default_max_iterations() -> u32 {
    100
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            method: RootMethod::default(),
            tolerance: default_solver_tolerance(),
            max_iterations: default_max_iterations(),
            bracket: Bracket::default(),
        }
    }
}

impl SolverSettings {
    /// Solver configuration for the root finder.
    #[must_use]
    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig::new(self.tolerance, self.max_iterations)
    }
}

/// A fixed node placed before the first instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// Anchor knot.
    pub knot: f64,
    /// Node value at the anchor.
    pub value: f64,
}

impl Anchor {
    /// Creates an anchor.
    #[must_use]
    pub fn new(knot: f64, value: f64) -> Self {
        Self { knot, value }
    }
}

// =============================================================================
// CALIBRATION CONFIG
// =============================================================================

/// Complete calibration configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Segment settings.
    #[serde(default)]
    pub segment: SegmentSettings,

    /// Root finder settings.
    #[serde(default)]
    pub solver: SolverSettings,

    /// Optional fixed first node.
    #[serde(default)]
    pub anchor: Option<Anchor>,

    /// Behaviour outside the knot range.
    #[serde(default)]
    pub extrapolation: Extrapolation,

    /// Shape passes applied after calibration.
    #[serde(default)]
    pub shape: ShapeSettings,

    /// Tolerance of the post-calibration repricing report.
    #[serde(default = "default_repricing_tolerance")]
    pub repricing_tolerance: f64,
}

fn default_repricing_tolerance() -> f64 {
    crate::repricing::DEFAULT_REPRICING_TOLERANCE
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            segment: SegmentSettings::default(),
            solver: SolverSettings::default(),
            anchor: None,
            extrapolation: Extrapolation::default(),
            shape: ShapeSettings::default(),
            repricing_tolerance: default_repricing_tolerance(),
        }
    }
}

impl CalibrationConfig {
    /// Parses and validates a TOML configuration.
    pub fn from_toml_str(input: &str) -> CurveResult<Self> {
        let config: Self = toml::from_str(input)
            .map_err(|e| CurveError::invalid_input(format!("invalid TOML configuration: {e}")))?;
        config.validate_or_error()?;
        Ok(config)
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(input: &str) -> CurveResult<Self> {
        let config: Self = serde_json::from_str(input)
            .map_err(|e| CurveError::invalid_input(format!("invalid JSON configuration: {e}")))?;
        config.validate_or_error()?;
        Ok(config)
    }

    /// Serializes to TOML.
    pub fn to_toml_string(&self) -> CurveResult<String> {
        toml::to_string(self)
            .map_err(|e| CurveError::invalid_input(format!("cannot serialize configuration: {e}")))
    }

    /// Sets the anchor node.
    #[must_use]
    pub fn with_anchor(mut self, knot: f64, value: f64) -> Self {
        self.anchor = Some(Anchor::new(knot, value));
        self
    }

    /// Sets the shape passes.
    #[must_use]
    pub fn with_shape(mut self, shape: ShapeSettings) -> Self {
        self.shape = shape;
        self
    }

    /// Sets the extrapolation policy.
    #[must_use]
    pub fn with_extrapolation(mut self, extrapolation: Extrapolation) -> Self {
        self.extrapolation = extrapolation;
        self
    }

    /// Sets the segment basis.
    #[must_use]
    pub fn with_basis(mut self, basis: BasisFamily) -> Self {
        self.segment.basis = basis;
        self
    }

    /// Sets the continuity order.
    #[must_use]
    pub fn with_continuity_order(mut self, order: usize) -> Self {
        self.segment.continuity_order = order;
        self
    }

    /// Sets the roughness penalty order.
    #[must_use]
    pub fn with_roughness_penalty_order(mut self, order: usize) -> Self {
        self.segment.roughness_penalty_order = order;
        self
    }

    /// Adds an interior response constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: ResponseConstraint) -> Self {
        self.segment.constraints.push(constraint);
        self
    }

    /// Sets the root-finding method.
    #[must_use]
    pub fn with_root_method(mut self, method: RootMethod) -> Self {
        self.solver.method = method;
        self
    }

    /// Sets the node search interval.
    #[must_use]
    pub fn with_bracket(mut self, bracket: Bracket) -> Self {
        self.solver.bracket = bracket;
        self
    }

    /// Sets the solver tolerance and iteration cap.
    #[must_use]
    pub fn with_solver_limits(mut self, tolerance: f64, max_iterations: u32) -> Self {
        self.solver.tolerance = tolerance;
        self.solver.max_iterations = max_iterations;
        self
    }

    /// Sets the repricing tolerance.
    #[must_use]
    pub fn with_repricing_tolerance(mut self, tolerance: f64) -> Self {
        self.repricing_tolerance = tolerance;
        self
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// A single configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Field that failed validation.
    pub field: String,
    /// Validation error message.
    pub message: String,
    /// Validation rule that was violated.
    pub rule: Option<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: None,
        }
    }

    /// Creates a validation error with a rule name.
    pub fn with_rule(
        field: impl Into<String>,
        message: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: Some(rule.into()),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref rule) = self.rule {
            write!(f, "{}: {} (rule: {})", self.field, self.message, rule)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Trait for validatable configurations.
pub trait Validate {
    /// Returns every problem found, or an empty vector if valid.
    fn validate(&self) -> Vec<ValidationError>;

    /// Returns true if the configuration is valid.
    fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Validates and folds all problems into one [`CurveError::InvalidInput`].
    fn validate_or_error(&self) -> CurveResult<()> {
        let errors = self.validate();
        if errors.is_empty() {
            return Ok(());
        }
        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(CurveError::invalid_input(joined))
    }
}

fn positive_finite(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl Validate for SegmentSettings {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let required = self.continuity_order + 2;
        if self.basis.size() < required {
            errors.push(ValidationError::with_rule(
                "continuity_order",
                format!(
                    "{} basis has {} functions, C{} needs at least {required}",
                    self.basis.name(),
                    self.basis.size(),
                    self.continuity_order
                ),
                "basis_size",
            ));
        }

        if self.roughness_penalty_order == 0 {
            errors.push(ValidationError::with_rule(
                "roughness_penalty_order",
                "Roughness penalty order must be positive",
                "positive_order",
            ));
        }

        if !positive_finite(self.max_condition_number) || self.max_condition_number < 1.0 {
            errors.push(ValidationError::with_rule(
                "max_condition_number",
                "Condition number cap must be finite and at least 1",
                "valid_condition_cap",
            ));
        }

        errors
    }
}

impl Validate for SolverSettings {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !positive_finite(self.tolerance) {
            errors.push(ValidationError::with_rule(
                "tolerance",
                "Solver tolerance must be positive",
                "valid_tolerance",
            ));
        }

        if self.max_iterations == 0 || self.max_iterations > 10_000 {
            errors.push(ValidationError::with_rule(
                "max_iterations",
                "Max iterations must be between 1 and 10000",
                "valid_iterations",
            ));
        }

        errors
    }
}

impl Validate for CalibrationConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for error in self.segment.validate() {
            errors.push(ValidationError {
                field: format!("segment.{}", error.field),
                ..error
            });
        }
        for error in self.solver.validate() {
            errors.push(ValidationError {
                field: format!("solver.{}", error.field),
                ..error
            });
        }

        if let Some(anchor) = self.anchor {
            if !anchor.knot.is_finite() || !anchor.value.is_finite() {
                errors.push(ValidationError::new(
                    "anchor",
                    "Anchor knot and value must be finite",
                ));
            }
        }

        if self.shape.samples_per_segment < 2 {
            errors.push(ValidationError::with_rule(
                "shape.samples_per_segment",
                "At least 2 derivative samples per segment are required",
                "min_samples",
            ));
        }

        if !positive_finite(self.repricing_tolerance) {
            errors.push(ValidationError::with_rule(
                "repricing_tolerance",
                "Repricing tolerance must be positive",
                "valid_tolerance",
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::C1Generator;

    #[test]
    fn test_default_is_valid() {
        let config = CalibrationConfig::default();
        assert!(config.is_valid());
        assert_eq!(config.segment.continuity_order, 1);
        assert_eq!(config.segment.roughness_penalty_order, 2);
        assert_eq!(config.solver.method, RootMethod::GuardedSecant);
        assert!(config.anchor.is_none());
    }

    #[test]
    fn test_from_toml() {
        let config = CalibrationConfig::from_toml_str(
            r#"
            repricing_tolerance = 1e-10

            [segment]
            continuity_order = 1

            [segment.basis]
            kind = "hyperbolic_tension"
            tension = 1.5

            [solver]
            method = "brent"
            bracket = { lower = -0.5, upper = 0.5 }

            [anchor]
            knot = 0.0
            value = 0.01

            [shape]
            c1_generator = "harmonic"
            monotone_filter = true
            "#,
        )
        .unwrap();

        assert_eq!(config.segment.basis.name(), "Hyperbolic tension");
        assert_eq!(config.segment.roughness_penalty_order, 2);
        assert_eq!(config.solver.method, RootMethod::Brent);
        assert_eq!(config.solver.bracket.upper(), 0.5);
        assert_eq!(config.anchor, Some(Anchor::new(0.0, 0.01)));
        assert_eq!(config.shape.c1_generator, Some(C1Generator::Harmonic));
        assert!(config.shape.monotone_filter);
        assert_eq!(config.shape.samples_per_segment, 64);
        assert_eq!(config.repricing_tolerance, 1e-10);
    }

    #[test]
    fn test_from_json_defaults_everything() {
        let config = CalibrationConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CalibrationConfig::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = CalibrationConfig::default()
            .with_anchor(0.0, 0.02)
            .with_root_method(RootMethod::Bisection)
            .with_shape(ShapeSettings::monotone());
        let text = config.to_toml_string().unwrap();
        assert_eq!(CalibrationConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_validation_collects_all_problems() {
        let config = CalibrationConfig::default()
            .with_continuity_order(3)
            .with_solver_limits(0.0, 0)
            .with_repricing_tolerance(f64::NAN);
        let errors = config.validate();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"segment.continuity_order"));
        assert!(fields.contains(&"solver.tolerance"));
        assert!(fields.contains(&"solver.max_iterations"));
        assert!(fields.contains(&"repricing_tolerance"));

        let err = config.validate_or_error().unwrap_err();
        assert!(err.to_string().contains("basis_size"));
    }

    #[test]
    fn test_invalid_bracket_rejected_at_parse() {
        let err = CalibrationConfig::from_json_str(
            r#"{"solver": {"bracket": {"lower": 1.0, "upper": 0.0}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CurveError::InvalidInput { .. }));
    }

    #[test]
    fn test_settings_build_fitter() {
        let settings = SegmentSettings {
            continuity_order: 2,
            ..SegmentSettings::default()
        };
        let fitter = settings.fitter().unwrap();
        assert_eq!(fitter.continuity_order(), 2);
    }
}
