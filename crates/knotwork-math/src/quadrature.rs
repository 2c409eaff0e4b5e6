//! Gauss-Legendre quadrature on finite intervals.

/// Abscissae of the 8-point Gauss-Legendre rule on `[-1, 1]` (positive half).
const NODES: [f64; 4] = [
    0.183_434_642_495_649_8,
    0.525_532_409_916_329_0,
    0.796_666_477_413_626_7,
    0.960_289_856_497_536_3,
];

/// Weights matching [`NODES`].
const WEIGHTS: [f64; 4] = [
    0.362_683_783_378_362_0,
    0.313_706_645_877_887_3,
    0.222_381_034_453_374_5,
    0.101_228_536_290_376_3,
];

/// Integrates `f` over `[a, b]` with the 8-point Gauss-Legendre rule.
///
/// Exact for polynomials up to degree 15.
pub fn gauss_legendre<F>(mut f: F, a: f64, b: f64) -> f64
where
    F: FnMut(f64) -> f64,
{
    let mid = 0.5 * (a + b);
    let half = 0.5 * (b - a);
    let mut sum = 0.0;
    for (node, weight) in NODES.iter().zip(WEIGHTS.iter()) {
        let offset = half * node;
        sum += weight * (f(mid - offset) + f(mid + offset));
    }
    sum * half
}

/// Composite rule: splits `[a, b]` into `panels` equal pieces.
pub fn composite_gauss_legendre<F>(mut f: F, a: f64, b: f64, panels: usize) -> f64
where
    F: FnMut(f64) -> f64,
{
    let panels = panels.max(1);
    let width = (b - a) / panels as f64;
    (0..panels)
        .map(|k| {
            let lo = a + width * k as f64;
            gauss_legendre(&mut f, lo, lo + width)
        })
        .sum()
}
