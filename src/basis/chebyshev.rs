//! Chebyshev polynomials of the first kind on the Gauss-Chebyshev grid.
use nalgebra::DMatrix;
use num::complex::Complex64;
use std::f64::consts::PI;

fn theta(j: usize, size: usize) -> f64 {
    PI * (j as f64 + 0.5) / size as f64
}

/// Gauss-Chebyshev points on `[-1, 1]`, in ascending order.
pub fn native_grid(size: usize) -> Vec<f64> {
    (0..size).map(|j| -theta(j, size).cos()).collect()
}

// T_n(-cos t) = cos(n (pi - t))
fn t_at_node(n: usize, j: usize, size: usize) -> f64 {
    (n as f64 * (PI - theta(j, size))).cos()
}

pub fn backward_matrix(size: usize) -> DMatrix<Complex64> {
    DMatrix::from_fn(size, size, |j, n| Complex64::new(t_at_node(n, j, size), 0.0))
}

/// Discrete cosine transform based on the discrete orthogonality of `T_n` on the grid.
pub fn forward_matrix(size: usize) -> DMatrix<Complex64> {
    DMatrix::from_fn(size, size, |n, j| {
        let scale = if n == 0 { 1.0 } else { 2.0 } / size as f64;
        Complex64::new(scale * t_at_node(n, j, size), 0.0)
    })
}

/// Coefficients of the derivative with respect to the native coordinate.
///
/// Uses the backward recurrence `d_n = d_{n+2} + 2 (n + 1) c_{n+1}`, with `d_0` halved.
pub fn differentiate_native(coefficients: &[Complex64]) -> Vec<Complex64> {
    let size = coefficients.len();
    let mut d = vec![Complex64::new(0.0, 0.0); size + 2];
    for n in (0..size.saturating_sub(1)).rev() {
        d[n] = d[n + 2] + coefficients[n + 1] * (2.0 * (n + 1) as f64);
    }
    if size > 0 {
        d[0] *= 0.5;
    }
    d.truncate(size);
    d
}

pub fn derivative_matrix(size: usize, length: f64) -> DMatrix<Complex64> {
    let scale = 2.0 / length;
    let mut matrix = DMatrix::zeros(size, size);
    let mut unit = vec![Complex64::new(0.0, 0.0); size];
    for m in 0..size {
        unit[m] = Complex64::new(1.0, 0.0);
        let column = differentiate_native(&unit);
        for (n, value) in column.into_iter().enumerate() {
            matrix[(n, m)] = value * scale;
        }
        unit[m] = Complex64::new(0.0, 0.0);
    }
    matrix
}

/// Values `T_n(xi)` for `n` in `0 .. size`.
pub fn evaluation_row(size: usize, xi: f64) -> Vec<Complex64> {
    let mut row = Vec::with_capacity(size);
    let (mut previous, mut current) = (1.0, xi);
    for n in 0..size {
        match n {
            0 => row.push(1.0),
            1 => row.push(xi),
            _ => {
                let next = 2.0 * xi * current - previous;
                previous = current;
                current = next;
                row.push(next);
            }
        }
    }
    row.into_iter().map(|v| Complex64::new(v, 0.0)).collect()
}
