//! Complex exponential basis `exp(i k x)` on a periodic interval.
use nalgebra::DMatrix;
use num::complex::Complex64;
use std::f64::consts::PI;

/// Signed wavenumber index of coefficient `i` in FFT ordering.
pub fn wavenumber_index(i: usize, size: usize) -> isize {
    if 2 * i < size {
        i as isize
    } else {
        i as isize - size as isize
    }
}

/// Position of the coefficient with signed wavenumber index `n`, if the basis represents it.
pub fn coefficient_position(n: isize, size: usize) -> Option<usize> {
    let position = if n >= 0 { n } else { n + size as isize };
    if position < 0 || position >= size as isize {
        return None;
    }
    let position = position as usize;
    (wavenumber_index(position, size) == n).then_some(position)
}

fn wavenumber(i: usize, size: usize, length: f64) -> f64 {
    2.0 * PI * wavenumber_index(i, size) as f64 / length
}

/// Equispaced grid on the native interval `[0, 1)`.
pub fn native_grid(size: usize) -> Vec<f64> {
    (0..size).map(|j| j as f64 / size as f64).collect()
}

pub fn backward_matrix(size: usize) -> DMatrix<Complex64> {
    DMatrix::from_fn(size, size, |j, i| {
        let phase = 2.0 * PI * wavenumber_index(i, size) as f64 * j as f64 / size as f64;
        Complex64::from_polar(1.0, phase)
    })
}

pub fn forward_matrix(size: usize) -> DMatrix<Complex64> {
    let scale = 1.0 / size as f64;
    DMatrix::from_fn(size, size, |i, j| {
        let phase = -2.0 * PI * wavenumber_index(i, size) as f64 * j as f64 / size as f64;
        Complex64::from_polar(scale, phase)
    })
}

/// Whether coefficient `i` is the Nyquist mode, which only exists for even sizes.
///
/// The Nyquist mode is stored at wavenumber `-N/2` but stands for the real `cos(N/2 x)`, so it
/// has a zero derivative and is split evenly between `+N/2` and `-N/2` when padded.
pub fn is_nyquist(i: usize, size: usize) -> bool {
    size % 2 == 0 && 2 * i == size
}

/// Diagonal matrix of `i k` for a period of the given length.
pub fn derivative_matrix(size: usize, length: f64) -> DMatrix<Complex64> {
    DMatrix::from_fn(size, size, |r, c| {
        if r == c && !is_nyquist(r, size) {
            Complex64::new(0.0, wavenumber(r, size, length))
        } else {
            Complex64::new(0.0, 0.0)
        }
    })
}

/// Values of every basis function at the given offset from the left bound.
pub fn evaluation_row(size: usize, offset: f64, length: f64) -> Vec<Complex64> {
    (0..size)
        .map(|i| {
            let phase = wavenumber(i, size, length) * offset;
            if is_nyquist(i, size) {
                Complex64::new(phase.cos(), 0.0)
            } else {
                Complex64::from_polar(1.0, phase)
            }
        })
        .collect()
}

/// Weighted `(target, source)` entries embedding a basis of size `from` into one of size `to`.
///
/// Modes are matched by wavenumber. Padding splits the Nyquist mode of `from` over `+N/2` and
/// `-N/2`. Truncation folds both `+M/2` and `-M/2` onto the Nyquist mode of `to`, and drops
/// the Nyquist mode of `from`.
pub fn embedding_weights(from: usize, to: usize) -> Vec<(usize, usize, f64)> {
    let mut weights = Vec::with_capacity(from);
    for source in 0..from {
        let n = wavenumber_index(source, from);
        if from == to {
            weights.push((source, source, 1.0));
        } else if is_nyquist(source, from) {
            if to > from {
                for k in [n, -n] {
                    if let Some(target) = coefficient_position(k, to) {
                        weights.push((target, source, 0.5));
                    }
                }
            }
        } else if to % 2 == 0 && 2 * n.unsigned_abs() == to {
            weights.push((to / 2, source, 1.0));
        } else if let Some(target) = coefficient_position(n, to) {
            weights.push((target, source, 1.0));
        }
    }
    weights
}
