//! Legendre polynomials on the Gauss-Legendre grid.
use nalgebra::DMatrix;
use num::complex::Complex64;
use std::f64::consts::PI;

/// Three-term recurrence for Legendre polynomials.
///
/// The derivative formula is singular at `|x| == 1`, so the derivative is only used in the open
/// interval `(-1, 1)`, where the Gauss points live.
#[derive(Debug, Default)]
struct LegendreRecurrence {
    n: usize,
    x: f64,
    // p_n(x)
    p1: f64,
    // p_{n - 1}(x)
    p2: f64,
}

impl LegendreRecurrence {
    fn evaluate(n: usize, x: f64) -> Self {
        //  m P_m(x) = (2m - 1) * x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let mut p1 = 1.0;
        let mut p2 = 0.0;
        let mut p3;
        for m in 1..=n {
            let m = m as f64;
            p3 = p2;
            p2 = p1;
            p1 = ((2.0 * m - 1.0) * x * p2 - (m - 1.0) * p3) / m;
        }

        Self { n, x, p1, p2 }
    }

    fn value(&self) -> f64 {
        self.p1
    }

    fn derivative(&self) -> f64 {
        let Self { n, x, p1, p2 } = &self;
        let n = *n as f64;
        n * (x * p1 - p2) / (x * x - 1.0)
    }
}

/// Gauss-Legendre points on `[-1, 1]` in ascending order, with their weights.
pub fn gauss(size: usize) -> (Vec<f64>, Vec<f64>) {
    let n = size;
    let m = (n + 1) / 2;
    let mut points = vec![0.0; n];
    let mut weights = vec![0.0; n];

    // Roots come in symmetric pairs, so only the upper half is found by Newton's method
    for i in 0..m {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut iterations = 0;
        let dp = loop {
            let recurrence = LegendreRecurrence::evaluate(n, x);
            let dp = recurrence.derivative();
            let dx = -recurrence.value() / dp;
            x += dx;
            iterations += 1;
            if dx.abs() <= 1e-15 || iterations >= 100 {
                break LegendreRecurrence::evaluate(n, x).derivative();
            }
        };
        let w = 2.0 / ((1.0 - x * x) * dp * dp);

        points[n - 1 - i] = x;
        weights[n - 1 - i] = w;
        points[i] = -x;
        weights[i] = w;
    }

    (points, weights)
}

/// Values `P_n(xi)` for `n` in `0 .. size`.
pub fn evaluation_row(size: usize, xi: f64) -> Vec<Complex64> {
    (0..size)
        .map(|n| Complex64::new(LegendreRecurrence::evaluate(n, xi).value(), 0.0))
        .collect()
}

pub fn backward_matrix(points: &[f64]) -> DMatrix<Complex64> {
    let size = points.len();
    DMatrix::from_fn(size, size, |j, n| {
        Complex64::new(LegendreRecurrence::evaluate(n, points[j]).value(), 0.0)
    })
}

/// Projection onto `P_n` by Gauss quadrature, which is exact for polynomials of degree `< size`.
pub fn forward_matrix(points: &[f64], weights: &[f64]) -> DMatrix<Complex64> {
    let size = points.len();
    DMatrix::from_fn(size, size, |n, j| {
        let norm = (2.0 * n as f64 + 1.0) / 2.0;
        let p = LegendreRecurrence::evaluate(n, points[j]).value();
        Complex64::new(norm * weights[j] * p, 0.0)
    })
}

/// `d_n = (2n + 1) sum_{m > n, m + n odd} c_m`, scaled to a physical interval of the given length.
pub fn derivative_matrix(size: usize, length: f64) -> DMatrix<Complex64> {
    let scale = 2.0 / length;
    DMatrix::from_fn(size, size, |n, m| {
        if m > n && (m + n) % 2 == 1 {
            Complex64::new(scale * (2.0 * n as f64 + 1.0), 0.0)
        } else {
            Complex64::new(0.0, 0.0)
        }
    })
}
