//! Gauss–Legendre rules on the unit interval `[0, 1]`.
use fenris_quadrature::univariate;

/// Weights and (scalar) points of a one-dimensional rule.
pub type Rule1d = (Vec<f64>, Vec<f64>);

/// Gauss quadrature for the unit interval with `num_points` points, exact for polynomials of
/// order up to `2 num_points - 1`.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss(num_points: usize) -> Rule1d {
    let (weights, points) = univariate::gauss(num_points);
    let weights = weights.into_iter().map(|w| 0.5 * w).collect();
    let points = points.into_iter().map(|[x]| 0.5 * (x + 1.0)).collect();
    (weights, points)
}
