use crate::basis::{Basis, BasisKind};
use crate::coords::Coordinate;
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use num::complex::Complex64;

impl Arbitrary for BasisKind {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            Just(BasisKind::ComplexFourier),
            Just(BasisKind::ChebyshevT),
            Just(BasisKind::Legendre)
        ]
        .boxed()
    }
}

pub fn complex() -> impl Strategy<Value = Complex64> {
    // Keep magnitudes moderate so that absolute tolerances remain meaningful
    let range = -10.0..10.0;
    (range.clone(), range).prop_map(|(re, im)| Complex64::new(re, im))
}

pub fn complex_vec(len: usize) -> impl Strategy<Value = Vec<Complex64>> {
    vec(complex(), len)
}

/// Interval bounds `(a, b)` with `a < b`.
pub fn bounds() -> impl Strategy<Value = (f64, f64)> {
    (-5.0..5.0, 0.1..10.0).prop_map(|(a, length): (f64, f64)| (a, a + length))
}

/// Bases of the given kind along `coord`, with sizes in `sizes`.
pub fn basis(
    coord: Coordinate,
    kind: BasisKind,
    sizes: impl Strategy<Value = usize>,
) -> impl Strategy<Value = Basis> {
    (sizes, bounds()).prop_map(move |(size, bounds)| {
        Basis::new(&coord, kind, size, bounds).expect("size and bounds are valid by construction")
    })
}

/// Bases of the given kind together with matching grid data.
pub fn basis_with_grid_data(
    coord: Coordinate,
    kind: BasisKind,
    sizes: impl Strategy<Value = usize>,
) -> impl Strategy<Value = (Basis, Vec<Complex64>)> {
    basis(coord, kind, sizes).prop_flat_map(|basis| {
        let n = basis.size();
        (Just(basis), complex_vec(n))
    })
}
