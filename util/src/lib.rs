use num::complex::Complex64;

/// Largest entry-wise absolute difference between two complex slices.
///
/// # Panics
///
/// Panics if the slices differ in length.
pub fn max_abs_diff(a: &[Complex64], b: &[Complex64]) -> f64 {
    assert_eq!(a.len(), b.len(), "Slices must have the same length.");
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).norm())
        .fold(0.0, f64::max)
}

/// Poor man's approx assertion for slices of complex numbers
#[macro_export]
macro_rules! assert_approx_complex_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let x: &[num::complex::Complex64] = &$x;
        let y: &[num::complex::Complex64] = &$y;
        let max_absdiff = $crate::max_abs_diff(x, y);
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("max absdiff: {:e}", max_absdiff);
            println!("left: {:?}", x);
            println!("right: {:?}", y);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}
