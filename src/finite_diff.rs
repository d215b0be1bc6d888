//! Numerical gradients for checking the results of either differentiation mode.

/// Central finite difference gradient of `f` at `point`.
///
/// ```
/// use scalargrad::finite_diff::finite_diff_grad;
///
/// let grads = finite_diff_grad(|v: &[f64]| v[0] * v[1] + v[0].sin(), &[2., 5.], 1e-6);
/// assert!((grads[0] - (5. + 2f64.cos())).abs() < 1e-6);
/// assert!((grads[1] - 2.).abs() < 1e-6);
/// ```
pub fn finite_diff_grad(f: impl Fn(&[f64]) -> f64, point: &[f64], eps: f64) -> Vec<f64> {
    let mut shifted = point.to_vec();
    (0..point.len())
        .map(|i| {
            shifted[i] = point[i] + eps;
            let upper = f(&shifted);
            shifted[i] = point[i] - eps;
            let lower = f(&shifted);
            shifted[i] = point[i];
            (upper - lower) / (2. * eps)
        })
        .collect()
}

/// Largest absolute difference between two gradients of the same length.
///
/// # Panics
///
/// Panics if the lengths differ.
pub fn max_grad_error(lhs: &[f64], rhs: &[f64]) -> f64 {
    assert_eq!(lhs.len(), rhs.len(), "gradient lengths differ");
    lhs.iter()
        .zip(rhs)
        .map(|(l, r)| (l - r).abs())
        .fold(0., f64::max)
}

#[test]
fn test_polynomial() {
    // d/dx (x^3 - 2xy) = 3x^2 - 2y, d/dy = -2x
    let grads = finite_diff_grad(|v| v[0].powi(3) - 2. * v[0] * v[1], &[1.5, -1.], 1e-6);
    approx::assert_abs_diff_eq!(grads[0], 3. * 1.5 * 1.5 + 2., epsilon = 1e-6);
    approx::assert_abs_diff_eq!(grads[1], -3., epsilon = 1e-6);
}

#[test]
fn test_max_grad_error() {
    assert_eq!(max_grad_error(&[1., 2., 3.], &[1., 2.5, 2.75]), 0.5);
    assert_eq!(max_grad_error(&[], &[]), 0.);
}
