//! Shape control passes over a calibrated regime.
//!
//! Passes run in a fixed order:
//!
//! 1. **C1 generator**: knot slopes re-derived from the node sequence, every
//!    segment rebuilt as a Hermite segment in the regime's basis family.
//! 2. **Monotone filter**: Hyman clamping of knot slopes; segments whose end
//!    slopes move, or whose derivative disagrees with their secant, are
//!    rebuilt from the clamped slopes. Where the family's Hermite segment
//!    still leaves the secant's sign, the slopes at its knots are halved
//!    (and finally zeroed) until it does not.
//! 3. **Spurious extrema elimination**: a segment with an interior extremum
//!    whose end knots are not extrema of the node sequence is flattened.
//!    Neighbours rewritten to keep C1 are checked again.
//!
//! Node values and basis families never change. A pass that would break the
//! configured continuity order, overwrite a segment carrying interior
//! response constraints, or needs a Hermite segment from a family with fewer
//! than four functions fails with [`CurveError::ShapeConstraintConflict`].

use std::collections::VecDeque;

use knotwork_math::spline::{BasisFamily, SegmentBasis, SegmentFitter};
use serde::{Deserialize, Serialize};

use crate::error::{CurveError, CurveResult};
use crate::regime::Regime;

/// Default number of interior derivative samples per segment.
pub const DEFAULT_SAMPLES_PER_SEGMENT: usize = 64;

/// Slope factors tried, in order, when a Hermite segment leaves its secant's
/// sign.
const DAMPING: [f64; 5] = [1.0, 0.5, 0.25, 0.125, 0.0];

/// Knot slope schemes for local-control Hermite curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum C1Generator {
    /// Slope of the parabola through the knot and its neighbours.
    Bessel,
    /// Weighted harmonic mean of adjacent secants (zero at data extrema).
    Harmonic,
    /// Van Leer limiter: harmonic mean interior, secant ends.
    VanLeer,
    /// Kruger's constrained cubic: harmonic mean interior, parabolic ends.
    Kruger,
    /// Akima's weighted secant average.
    Akima,
}

impl C1Generator {
    /// Returns the name of the scheme.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            C1Generator::Bessel => "Bessel",
            C1Generator::Harmonic => "Harmonic",
            C1Generator::VanLeer => "Van Leer",
            C1Generator::Kruger => "Kruger",
            C1Generator::Akima => "Akima",
        }
    }
}

/// Which shape passes to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeSettings {
    /// Slope scheme for pass 1, if any.
    #[serde(default)]
    pub c1_generator: Option<C1Generator>,

    /// Enables pass 2.
    #[serde(default)]
    pub monotone_filter: bool,

    /// Enables pass 3.
    #[serde(default)]
    pub eliminate_spurious_extrema: bool,

    /// Interior derivative samples per segment.
    #[serde(default = "default_samples_per_segment")]
    pub samples_per_segment: usize,
}

fn default_samples_per_segment() -> usize {
    DEFAULT_SAMPLES_PER_SEGMENT
}

impl Default for ShapeSettings {
    fn default() -> Self {
        Self {
            c1_generator: None,
            monotone_filter: false,
            eliminate_spurious_extrema: false,
            samples_per_segment: DEFAULT_SAMPLES_PER_SEGMENT,
        }
    }
}

impl ShapeSettings {
    /// Monotone filter only.
    #[must_use]
    pub fn monotone() -> Self {
        Self {
            monotone_filter: true,
            ..Self::default()
        }
    }

    /// Sets the C1 generator.
    #[must_use]
    pub fn with_c1_generator(mut self, generator: C1Generator) -> Self {
        self.c1_generator = Some(generator);
        self
    }

    /// Enables or disables the monotone filter.
    #[must_use]
    pub fn with_monotone_filter(mut self, enabled: bool) -> Self {
        self.monotone_filter = enabled;
        self
    }

    /// Enables or disables spurious extrema elimination.
    #[must_use]
    pub fn with_extrema_elimination(mut self, enabled: bool) -> Self {
        self.eliminate_spurious_extrema = enabled;
        self
    }

    /// True if any pass is enabled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.c1_generator.is_some() || self.monotone_filter || self.eliminate_spurious_extrema
    }
}

/// Knot slopes for `generator` through `(knots, nodes)`.
///
/// Two knots give the secant at both ends; fewer give zeros.
#[must_use]
pub fn knot_slopes(generator: C1Generator, knots: &[f64], nodes: &[f64]) -> Vec<f64> {
    let n = knots.len().min(nodes.len());
    if n < 2 {
        return vec![0.0; n];
    }
    let h: Vec<f64> = knots[..n].windows(2).map(|w| w[1] - w[0]).collect();
    let d: Vec<f64> = (0..n - 1).map(|j| (nodes[j + 1] - nodes[j]) / h[j]).collect();
    if n == 2 {
        return vec![d[0]; 2];
    }
    let m = d.len();

    let harmonic_mean = |a: f64, b: f64| {
        if a * b <= 0.0 {
            0.0
        } else {
            2.0 * a * b / (a + b)
        }
    };

    match generator {
        C1Generator::Bessel => {
            let mut s = vec![0.0; n];
            s[0] = ((2.0 * h[0] + h[1]) * d[0] - h[0] * d[1]) / (h[0] + h[1]);
            for k in 1..n - 1 {
                s[k] = (h[k] * d[k - 1] + h[k - 1] * d[k]) / (h[k - 1] + h[k]);
            }
            s[n - 1] = ((2.0 * h[m - 1] + h[m - 2]) * d[m - 1] - h[m - 1] * d[m - 2])
                / (h[m - 1] + h[m - 2]);
            s
        }
        C1Generator::Harmonic => {
            let mut s = vec![0.0; n];
            for k in 1..n - 1 {
                if d[k - 1] * d[k] > 0.0 {
                    let w1 = 2.0 * h[k] + h[k - 1];
                    let w2 = h[k] + 2.0 * h[k - 1];
                    s[k] = (w1 + w2) / (w1 / d[k - 1] + w2 / d[k]);
                }
            }
            s[0] = shape_preserving_end(h[0], h[1], d[0], d[1]);
            s[n - 1] = shape_preserving_end(h[m - 1], h[m - 2], d[m - 1], d[m - 2]);
            s
        }
        C1Generator::VanLeer => {
            let mut s = vec![0.0; n];
            for k in 1..n - 1 {
                s[k] = harmonic_mean(d[k - 1], d[k]);
            }
            s[0] = d[0];
            s[n - 1] = d[m - 1];
            s
        }
        C1Generator::Kruger => {
            let mut s = vec![0.0; n];
            for k in 1..n - 1 {
                s[k] = harmonic_mean(d[k - 1], d[k]);
            }
            s[0] = 1.5 * d[0] - 0.5 * s[1];
            s[n - 1] = 1.5 * d[m - 1] - 0.5 * s[n - 2];
            s
        }
        C1Generator::Akima => akima(&d),
    }
}

/// One-sided three-point end slope, clamped to keep the end monotone.
fn shape_preserving_end(h0: f64, h1: f64, d0: f64, d1: f64) -> f64 {
    let s = ((2.0 * h0 + h1) * d0 - h0 * d1) / (h0 + h1);
    if s * d0 <= 0.0 {
        0.0
    } else if d0 * d1 < 0.0 && s.abs() > 3.0 * d0.abs() {
        3.0 * d0
    } else {
        s
    }
}

fn akima(d: &[f64]) -> Vec<f64> {
    let m = d.len();
    // Secants padded with two extrapolated values at each end.
    let mut ext = Vec::with_capacity(m + 4);
    let (d0, d1) = (d[0], d[1.min(m - 1)]);
    let before1 = 2.0 * d0 - d1;
    let before2 = 2.0 * before1 - d0;
    ext.push(before2);
    ext.push(before1);
    ext.extend_from_slice(d);
    let (last, prev) = (d[m - 1], d[m.saturating_sub(2)]);
    let after1 = 2.0 * last - prev;
    let after2 = 2.0 * after1 - last;
    ext.push(after1);
    ext.push(after2);

    // Knot k sits between ext[k + 1] (left secant) and ext[k + 2] (right).
    (0..=m)
        .map(|k| {
            let (m0, m1, m2, m3) = (ext[k], ext[k + 1], ext[k + 2], ext[k + 3]);
            let w_left = (m3 - m2).abs();
            let w_right = (m1 - m0).abs();
            if w_left + w_right == 0.0 {
                0.5 * (m1 + m2)
            } else {
                (w_left * m1 + w_right * m2) / (w_left + w_right)
            }
        })
        .collect()
}

/// Hyman clamp of `slope` against the adjacent secants.
fn hyman_clamp(slope: f64, secants: &[f64]) -> f64 {
    let Some(&first) = secants.first() else {
        return slope;
    };
    if secants.iter().any(|&d| d == 0.0 || d.signum() != first.signum()) {
        return 0.0;
    }
    let sigma = first.signum();
    let bound = 3.0 * secants.iter().fold(f64::INFINITY, |acc, d| acc.min(d.abs()));
    sigma * (sigma * slope).max(0.0).min(bound)
}

fn slope_changed(old: f64, new: f64) -> bool {
    (old - new).abs() > 1e-10 * old.abs().max(new.abs()) + 1e-15
}

/// Smallest and largest first derivative over the segment.
fn derivative_range(segment: &SegmentBasis, samples: usize) -> (f64, f64) {
    let (a, b) = (segment.left(), segment.right());
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    let mut visit = |x: f64| {
        let d = segment.derivative(x, 1);
        lo = lo.min(d);
        hi = hi.max(d);
    };
    let steps = samples + 1;
    for i in 0..=steps {
        visit(a + (b - a) * i as f64 / steps as f64);
    }
    if let BasisFamily::Polynomial { degree } = segment.family() {
        if degree <= 3 {
            // f' is at most quadratic in u; check its vertex exactly.
            let c = segment.coefficients();
            let c2 = c.get(2).copied().unwrap_or(0.0);
            let c3 = c.get(3).copied().unwrap_or(0.0);
            if c3 != 0.0 {
                let u = -c2 / (3.0 * c3);
                if u > 0.0 && u < 1.0 {
                    visit(a + u * (b - a));
                }
            }
        }
    }
    (lo, hi)
}

fn has_interior_extremum(segment: &SegmentBasis, samples: usize) -> bool {
    let (lo, hi) = derivative_range(segment, samples);
    let tol = 1e-10 * lo.abs().max(hi.abs());
    lo < -tol && hi > tol
}

/// True if the derivative never takes the opposite sign of `secant`.
fn follows_secant(segment: &SegmentBasis, secant: f64, samples: usize) -> bool {
    let (lo, hi) = derivative_range(segment, samples);
    let tol = 1e-10 * (secant.abs() + lo.abs().max(hi.abs()));
    if secant > 0.0 {
        lo >= -tol
    } else if secant < 0.0 {
        hi <= tol
    } else {
        lo >= -tol && hi <= tol
    }
}

/// Queue of segment indices, each present at most once.
struct Worklist {
    queue: VecDeque<usize>,
    queued: Vec<bool>,
}

impl Worklist {
    fn new(len: usize, initial: impl IntoIterator<Item = usize>) -> Self {
        let mut list = Self {
            queue: VecDeque::new(),
            queued: vec![false; len],
        };
        for j in initial {
            list.push(j);
        }
        list
    }

    fn push(&mut self, j: usize) {
        if !self.queued[j] {
            self.queued[j] = true;
            self.queue.push_back(j);
        }
    }

    fn pop(&mut self) -> Option<usize> {
        let j = self.queue.pop_front()?;
        self.queued[j] = false;
        Some(j)
    }
}

/// Applies the configured shape passes to a regime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeController {
    settings: ShapeSettings,
}

/// Inputs shared by every pass.
struct Pass<'a> {
    knots: &'a [f64],
    nodes: &'a [f64],
    fitter: &'a SegmentFitter,
    continuity_order: usize,
    samples: usize,
}

impl Pass<'_> {
    fn secant(&self, j: usize) -> f64 {
        (self.nodes[j + 1] - self.nodes[j]) / (self.knots[j + 1] - self.knots[j])
    }

    fn check_replaceable(&self, j: usize, pass: &str) -> CurveResult<()> {
        if self.continuity_order >= 2 {
            return Err(CurveError::shape_conflict(
                j,
                format!(
                    "{pass} would replace a C{} segment with a C1 Hermite",
                    self.continuity_order
                ),
            ));
        }
        let (left, right) = (self.knots[j], self.knots[j + 1]);
        if self
            .fitter
            .constraint_set()
            .applicable(left, right)
            .next()
            .is_some()
        {
            return Err(CurveError::shape_conflict(
                j,
                format!("{pass} would discard interior response constraints"),
            ));
        }
        Ok(())
    }

    /// Hermite segment on `j` in the fitter's family.
    fn hermite(&self, j: usize, s0: f64, s1: f64) -> CurveResult<SegmentBasis> {
        let family = self.fitter.family();
        if family.size() < 4 {
            return Err(CurveError::shape_conflict(
                j,
                format!(
                    "{} basis with {} functions cannot be rebuilt from end slopes",
                    family.name(),
                    family.size()
                ),
            ));
        }
        self.fitter
            .fit_hermite(
                self.knots[j],
                self.knots[j + 1],
                self.nodes[j],
                self.nodes[j + 1],
                s0,
                s1,
            )
            .map_err(|e| CurveError::from_segment_fit(j, e))
    }

    /// Hermite segment on `j` that follows its secant, with the end slopes
    /// actually used.
    fn monotone_hermite(
        &self,
        j: usize,
        s0: f64,
        s1: f64,
        pass: &str,
    ) -> CurveResult<(SegmentBasis, f64, f64)> {
        let secant = self.secant(j);
        for factor in DAMPING {
            let (d0, d1) = (s0 * factor, s1 * factor);
            let candidate = self.hermite(j, d0, d1)?;
            if follows_secant(&candidate, secant, self.samples) {
                return Ok((candidate, d0, d1));
            }
        }
        Err(CurveError::shape_conflict(
            j,
            format!(
                "{pass} found no monotone {} segment between the nodes",
                self.fitter.family().name()
            ),
        ))
    }

    /// Straight segment on `j` in the fitter's family.
    fn chord(&self, j: usize) -> CurveResult<SegmentBasis> {
        SegmentBasis::chord(
            self.fitter.family(),
            self.knots[j],
            self.knots[j + 1],
            self.nodes[j],
            self.nodes[j + 1],
        )
        .map_err(|e| CurveError::from_segment_fit(j, e))
    }

    fn is_data_extremum(&self, k: usize) -> bool {
        k > 0
            && k + 1 < self.nodes.len()
            && (self.nodes[k] - self.nodes[k - 1]) * (self.nodes[k + 1] - self.nodes[k]) < 0.0
    }

    /// Hyman-clamped slope at knot `k` against both adjacent secants.
    fn clamped_knot_slope(&self, k: usize, slope: f64) -> f64 {
        let m = self.nodes.len() - 1;
        let mut secants = Vec::with_capacity(2);
        if k > 0 {
            secants.push(self.secant(k - 1));
        }
        if k < m {
            secants.push(self.secant(k));
        }
        hyman_clamp(slope, &secants)
    }
}

impl ShapeController {
    /// Creates a controller.
    pub fn new(settings: ShapeSettings) -> CurveResult<Self> {
        if settings.samples_per_segment < 2 {
            return Err(CurveError::invalid_input(format!(
                "samples_per_segment must be at least 2, got {}",
                settings.samples_per_segment
            )));
        }
        Ok(Self { settings })
    }

    /// Settings in use.
    #[must_use]
    pub fn settings(&self) -> ShapeSettings {
        self.settings
    }

    /// Runs the enabled passes and returns the shaped regime.
    pub fn apply(&self, regime: &Regime) -> CurveResult<Regime> {
        let mut segments = regime.segments().to_vec();
        if !self.settings.is_active() || segments.is_empty() {
            return Ok(regime.with_segments(segments, self.settings));
        }

        let pass = Pass {
            knots: regime.knots(),
            nodes: regime.nodes(),
            fitter: regime.fitter(),
            continuity_order: regime.fitter().continuity_order(),
            samples: self.settings.samples_per_segment,
        };

        if let Some(generator) = self.settings.c1_generator {
            Self::generate_c1(&pass, generator, &mut segments)?;
        }
        if self.settings.monotone_filter {
            Self::filter_monotone(&pass, &mut segments)?;
        }
        if self.settings.eliminate_spurious_extrema {
            Self::eliminate_extrema(&pass, &mut segments)?;
        }

        Ok(regime.with_segments(segments, self.settings))
    }

    fn generate_c1(
        pass: &Pass<'_>,
        generator: C1Generator,
        segments: &mut [SegmentBasis],
    ) -> CurveResult<()> {
        let slopes = knot_slopes(generator, pass.knots, pass.nodes);
        for j in 0..segments.len() {
            pass.check_replaceable(j, generator.name())?;
            segments[j] = pass.hermite(j, slopes[j], slopes[j + 1])?;
        }
        tracing::debug!(
            generator = generator.name(),
            segments = segments.len(),
            "rebuilt segments from generated knot slopes"
        );
        Ok(())
    }

    fn filter_monotone(pass: &Pass<'_>, segments: &mut [SegmentBasis]) -> CurveResult<()> {
        let m = segments.len();
        let n = m + 1;

        // One-sided slopes at each knot: arriving from the left, leaving to the right.
        let mut arriving = vec![0.0; n];
        let mut leaving = vec![0.0; n];
        for (j, segment) in segments.iter().enumerate() {
            leaving[j] = segment.derivative(pass.knots[j], 1);
            arriving[j + 1] = segment.derivative(pass.knots[j + 1], 1);
        }

        let mut new_arriving = arriving.clone();
        let mut new_leaving = leaving.clone();
        for k in 0..n {
            if pass.continuity_order >= 1 {
                let current = if k < m { leaving[k] } else { arriving[k] };
                let clamped = pass.clamped_knot_slope(k, current);
                new_arriving[k] = clamped;
                new_leaving[k] = clamped;
            } else {
                if k > 0 {
                    new_arriving[k] = hyman_clamp(arriving[k], &[pass.secant(k - 1)]);
                }
                if k < m {
                    new_leaving[k] = hyman_clamp(leaving[k], &[pass.secant(k)]);
                }
            }
        }

        let pending = (0..m).filter(|&j| {
            let moved = slope_changed(leaving[j], new_leaving[j])
                || slope_changed(arriving[j + 1], new_arriving[j + 1]);
            moved || !follows_secant(&segments[j], pass.secant(j), pass.samples)
        });
        let mut work = Worklist::new(m, pending);

        let mut rebuilt = 0;
        let mut budget = 4 * DAMPING.len() * m;
        while let Some(j) = work.pop() {
            if budget == 0 {
                return Err(CurveError::shape_conflict(j, "monotone filter did not settle"));
            }
            budget -= 1;

            pass.check_replaceable(j, "monotone filter")?;
            let (segment, s0, s1) =
                pass.monotone_hermite(j, new_leaving[j], new_arriving[j + 1], "monotone filter")?;
            segments[j] = segment;
            rebuilt += 1;

            // Damped slopes carry over to the neighbours under C1.
            if pass.continuity_order >= 1 {
                if j > 0 && slope_changed(new_arriving[j], s0) {
                    new_arriving[j] = s0;
                    work.push(j - 1);
                }
                if j + 1 < m && slope_changed(new_leaving[j + 1], s1) {
                    new_leaving[j + 1] = s1;
                    work.push(j + 1);
                }
            }
            new_leaving[j] = s0;
            new_arriving[j + 1] = s1;
        }
        tracing::debug!(rebuilt, segments = m, "monotone filter applied");
        Ok(())
    }

    fn eliminate_extrema(pass: &Pass<'_>, segments: &mut [SegmentBasis]) -> CurveResult<()> {
        let m = segments.len();
        let mut work = Worklist::new(m, 0..m);
        let mut budget = 4 * DAMPING.len() * m;
        while let Some(j) = work.pop() {
            if !has_interior_extremum(&segments[j], pass.samples)
                || pass.is_data_extremum(j)
                || pass.is_data_extremum(j + 1)
            {
                continue;
            }
            if budget == 0 {
                return Err(CurveError::shape_conflict(j, "extrema elimination did not settle"));
            }
            budget -= 1;
            pass.check_replaceable(j, "extrema elimination")?;

            let s0 = segments[j].derivative(pass.knots[j], 1);
            let s1 = segments[j].derivative(pass.knots[j + 1], 1);
            let candidate = pass.hermite(j, s0, s1)?;
            if !has_interior_extremum(&candidate, pass.samples) {
                segments[j] = candidate;
                continue;
            }

            if pass.continuity_order == 0 {
                segments[j] = pass.chord(j)?;
                continue;
            }

            // C1: clamp both end slopes and mirror them into the neighbours.
            let (segment, c0, c1) = pass.monotone_hermite(
                j,
                pass.clamped_knot_slope(j, s0),
                pass.clamped_knot_slope(j + 1, s1),
                "extrema elimination",
            )?;
            if j > 0 && slope_changed(s0, c0) {
                pass.check_replaceable(j - 1, "extrema elimination")?;
                let keep = segments[j - 1].derivative(pass.knots[j - 1], 1);
                segments[j - 1] = pass.hermite(j - 1, keep, c0)?;
                work.push(j - 1);
            }
            if j + 1 < m && slope_changed(s1, c1) {
                pass.check_replaceable(j + 1, "extrema elimination")?;
                let keep = segments[j + 1].derivative(pass.knots[j + 2], 1);
                segments[j + 1] = pass.hermite(j + 1, c1, keep)?;
                work.push(j + 1);
            }
            segments[j] = segment;
            tracing::debug!(segment = j, "spurious extremum removed with clamped slopes");
        }
        Ok(())
    }
}
