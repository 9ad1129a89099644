//! Helpers for row-major multi-dimensional buffers.
use nalgebra::DMatrix;
use num::complex::Complex64;
use num::Zero;
use rayon::prelude::*;
use std::ops::Range;

/// Contiguous block partition of `0 .. n` over `parts` ranks.
pub fn block_range(n: usize, parts: usize, rank: usize) -> Range<usize> {
    debug_assert!(rank < parts);
    (rank * n / parts)..((rank + 1) * n / parts)
}

/// Splits `shape` around `axis` into `(outer, n, inner)` extents.
pub fn split_extents(shape: &[usize], axis: usize) -> (usize, usize, usize) {
    let outer = shape[..axis].iter().product();
    let inner = shape[axis + 1..].iter().product();
    (outer, shape[axis], inner)
}

/// Multiplies `matrix` into every 1D fiber of `data` along `axis`.
///
/// The extent of `axis` in the output is `matrix.nrows()`, all other extents are preserved.
///
/// # Panics
///
/// Panics if `matrix.ncols()` does not equal the extent of `axis`.
pub fn apply_along_axis(data: &[Complex64], shape: &[usize], axis: usize, matrix: &DMatrix<Complex64>) -> Vec<Complex64> {
    let (outer, n, inner) = split_extents(shape, axis);
    assert_eq!(matrix.ncols(), n, "matrix does not match extent of axis {axis}");
    debug_assert_eq!(data.len(), outer * n * inner);
    let m = matrix.nrows();
    let mut output = vec![Complex64::zero(); outer * m * inner];
    if m * inner == 0 {
        return output;
    }

    output
        .par_chunks_mut(m * inner)
        .enumerate()
        .for_each(|(o, out_block)| {
            let in_block = &data[o * n * inner..(o + 1) * n * inner];
            let fibers = DMatrix::from_row_slice(n, inner, in_block);
            let result = matrix * fibers;
            for i in 0..m {
                for k in 0..inner {
                    out_block[i * inner + k] = result[(i, k)];
                }
            }
        });
    output
}

/// Copies the entries of `data` whose index along `axis` lies in `range`.
pub fn extract_range(data: &[Complex64], shape: &[usize], axis: usize, range: Range<usize>) -> Vec<Complex64> {
    let (outer, n, inner) = split_extents(shape, axis);
    let mut block = Vec::with_capacity(outer * range.len() * inner);
    for o in 0..outer {
        let start = (o * n + range.start) * inner;
        let end = (o * n + range.end) * inner;
        block.extend_from_slice(&data[start..end]);
    }
    block
}

/// Writes `block` into `data` at `offset` along `axis`, where `block` has extent `len` there.
pub fn insert_range(data: &mut [Complex64], shape: &[usize], axis: usize, offset: usize, block: &[Complex64], len: usize) {
    let (outer, n, inner) = split_extents(shape, axis);
    debug_assert_eq!(block.len(), outer * len * inner);
    for o in 0..outer {
        let start = (o * n + offset) * inner;
        let source = &block[o * len * inner..(o + 1) * len * inner];
        data[start..start + len * inner].copy_from_slice(source);
    }
}

/// Iterates over all multi-indices of `shape` in row-major order.
pub fn for_each_multi_index(shape: &[usize], mut f: impl FnMut(&[usize])) {
    if shape.iter().any(|&n| n == 0) {
        return;
    }
    let mut index = vec![0; shape.len()];
    loop {
        f(&index);
        let mut axis = shape.len();
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}
