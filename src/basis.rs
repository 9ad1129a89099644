//! Spectral bases for a single coordinate.
//!
//! A [`Basis`] discretizes one coordinate on a bounded interval. It owns the dense transform
//! matrices between grid values and spectral coefficients, the differentiation matrix in
//! coefficient space and the rules for embedding coefficients into a larger (or smaller) basis
//! of the same family. Bases are immutable and cheap to clone, so they are shared freely by
//! fields and layouts.
//!
//! Regardless of kind, the zeroth coefficient of a constant function equals that constant.
//! This is what allows basis-less (constant) operands to be promoted onto any basis.
use crate::coords::{Coordinate, CoordinateSystem};
use crate::error::SpectralError;
use nalgebra::{DMatrix, DVector};
use num::complex::Complex64;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

mod chebyshev;
mod fourier;
mod legendre;

/// The family of a spectral basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasisKind {
    /// Complex exponentials on a periodic interval.
    ComplexFourier,
    /// Chebyshev polynomials of the first kind on Gauss-Chebyshev points.
    ChebyshevT,
    /// Legendre polynomials on Gauss-Legendre points.
    Legendre,
}

impl BasisKind {
    pub fn is_periodic(&self) -> bool {
        matches!(self, Self::ComplexFourier)
    }

    /// Whether the modes of this family decouple under differentiation.
    pub fn is_separable(&self) -> bool {
        self.is_periodic()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ComplexFourier => "ComplexFourier",
            Self::ChebyshevT => "ChebyshevT",
            Self::Legendre => "Legendre",
        }
    }
}

/// Plain description of a basis, suitable for (de)serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisDescriptor {
    pub coordinate: String,
    pub kind: BasisKind,
    pub size: usize,
    pub bounds: (f64, f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BasisKey {
    coord: Coordinate,
    kind: BasisKind,
    size: usize,
    bounds: (OrderedFloat<f64>, OrderedFloat<f64>),
}

#[derive(Debug)]
struct BasisData {
    grid: Vec<f64>,
    forward: DMatrix<Complex64>,
    backward: DMatrix<Complex64>,
    derivative: DMatrix<Complex64>,
}

/// A spectral discretization of one coordinate.
///
/// Two bases are equal if they share coordinate, kind, size and bounds.
#[derive(Clone)]
pub struct Basis {
    key: BasisKey,
    data: Arc<BasisData>,
}

impl PartialEq for Basis {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Basis {}

impl Hash for Basis {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state)
    }
}

impl fmt::Debug for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Basis")
            .field("coordinate", &self.key.coord.name())
            .field("kind", &self.key.kind)
            .field("size", &self.key.size)
            .field("bounds", &self.bounds())
            .finish()
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.key.kind.name(), self.key.coord, self.key.size)
    }
}

impl Basis {
    pub fn new(coord: &Coordinate, kind: BasisKind, size: usize, bounds: (f64, f64)) -> Result<Self, SpectralError> {
        let (a, b) = bounds;
        if size == 0 {
            return Err(SpectralError::UnsupportedOperation(format!(
                "{} basis along '{coord}' must have at least one mode",
                kind.name()
            )));
        }
        if !(a.is_finite() && b.is_finite() && a < b) {
            return Err(SpectralError::UnsupportedOperation(format!(
                "invalid bounds ({a}, {b}) for basis along '{coord}'"
            )));
        }
        let length = b - a;

        let data = match kind {
            BasisKind::ComplexFourier => BasisData {
                grid: map_grid(fourier::native_grid(size), |s| a + length * s),
                forward: fourier::forward_matrix(size),
                backward: fourier::backward_matrix(size),
                derivative: fourier::derivative_matrix(size, length),
            },
            BasisKind::ChebyshevT => BasisData {
                grid: map_grid(chebyshev::native_grid(size), |xi| a + 0.5 * (xi + 1.0) * length),
                forward: chebyshev::forward_matrix(size),
                backward: chebyshev::backward_matrix(size),
                derivative: chebyshev::derivative_matrix(size, length),
            },
            BasisKind::Legendre => {
                let (points, weights) = legendre::gauss(size);
                BasisData {
                    grid: map_grid(points.clone(), |xi| a + 0.5 * (xi + 1.0) * length),
                    forward: legendre::forward_matrix(&points, &weights),
                    backward: legendre::backward_matrix(&points),
                    derivative: legendre::derivative_matrix(size, length),
                }
            }
        };

        Ok(Self {
            key: BasisKey {
                coord: coord.clone(),
                kind,
                size,
                bounds: (OrderedFloat(a), OrderedFloat(b)),
            },
            data: Arc::new(data),
        })
    }

    pub fn complex_fourier(coord: &Coordinate, size: usize, bounds: (f64, f64)) -> Result<Self, SpectralError> {
        Self::new(coord, BasisKind::ComplexFourier, size, bounds)
    }

    pub fn chebyshev_t(coord: &Coordinate, size: usize, bounds: (f64, f64)) -> Result<Self, SpectralError> {
        Self::new(coord, BasisKind::ChebyshevT, size, bounds)
    }

    pub fn legendre(coord: &Coordinate, size: usize, bounds: (f64, f64)) -> Result<Self, SpectralError> {
        Self::new(coord, BasisKind::Legendre, size, bounds)
    }

    /// Reconstructs a basis from its descriptor, resolving the coordinate in `coords`.
    pub fn from_descriptor(coords: &CoordinateSystem, descriptor: &BasisDescriptor) -> Result<Self, SpectralError> {
        let coord = coords.coord(&descriptor.coordinate)?;
        Self::new(coord, descriptor.kind, descriptor.size, descriptor.bounds)
    }

    pub fn descriptor(&self) -> BasisDescriptor {
        BasisDescriptor {
            coordinate: self.key.coord.name().to_string(),
            kind: self.key.kind,
            size: self.key.size,
            bounds: self.bounds(),
        }
    }

    pub fn coordinate(&self) -> &Coordinate {
        &self.key.coord
    }

    pub fn kind(&self) -> BasisKind {
        self.key.kind
    }

    pub fn size(&self) -> usize {
        self.key.size
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.key.bounds.0.into_inner(), self.key.bounds.1.into_inner())
    }

    pub fn length(&self) -> f64 {
        let (a, b) = self.bounds();
        b - a
    }

    /// Grid points in physical coordinates, in ascending order.
    pub fn grid_points(&self) -> &[f64] {
        &self.data.grid
    }

    /// Whether `self` and `other` discretize the same coordinate with the same family.
    pub fn is_compatible_with(&self, other: &Basis) -> bool {
        self.key.coord == other.key.coord && self.key.kind == other.key.kind && self.key.bounds == other.key.bounds
    }

    /// Transforms grid values to coefficients.
    ///
    /// # Panics
    ///
    /// Panics if `grid_data.len() != self.size()`.
    pub fn transform_forward(&self, grid_data: &[Complex64]) -> Vec<Complex64> {
        assert_eq!(grid_data.len(), self.size(), "grid data must match basis size");
        let result = &self.data.forward * DVector::from_column_slice(grid_data);
        result.as_slice().to_vec()
    }

    /// Transforms coefficients to grid values.
    ///
    /// # Panics
    ///
    /// Panics if `coefficient_data.len() != self.size()`.
    pub fn transform_backward(&self, coefficient_data: &[Complex64]) -> Vec<Complex64> {
        assert_eq!(coefficient_data.len(), self.size(), "coefficient data must match basis size");
        let result = &self.data.backward * DVector::from_column_slice(coefficient_data);
        result.as_slice().to_vec()
    }

    /// Applies the `order`-th derivative in coefficient space.
    ///
    /// # Panics
    ///
    /// Panics if `coefficient_data.len() != self.size()`.
    pub fn differentiate(&self, coefficient_data: &[Complex64], order: usize) -> Result<Vec<Complex64>, SpectralError> {
        assert_eq!(coefficient_data.len(), self.size(), "coefficient data must match basis size");
        let matrix = self.derivative_matrix(order)?;
        let result = matrix * DVector::from_column_slice(coefficient_data);
        Ok(result.as_slice().to_vec())
    }

    /// Evaluates the coefficient expansion at the given physical position.
    pub fn interpolate(&self, coefficient_data: &[Complex64], position: f64) -> Result<Complex64, SpectralError> {
        assert_eq!(coefficient_data.len(), self.size(), "coefficient data must match basis size");
        let row = self.interpolation_row(position)?;
        Ok(row
            .iter()
            .zip(coefficient_data)
            .map(|(r, c)| r * c)
            .sum())
    }

    /// Returns the coarsest basis onto which both `self` and `other` embed without loss.
    pub fn common_basis(&self, other: &Basis) -> Result<Basis, SpectralError> {
        if !self.is_compatible_with(other) {
            return Err(SpectralError::IncompatibleBasis(format!(
                "{self} on {:?} and {other} on {:?} have no common basis",
                self.bounds(),
                other.bounds()
            )));
        }
        if self.size() >= other.size() {
            Ok(self.clone())
        } else {
            Ok(other.clone())
        }
    }

    /// Maps coefficients of `self` onto the coefficient space of `target`.
    ///
    /// Modes absent from the target are dropped, modes absent from `self` are zero. For Fourier
    /// bases the Nyquist mode is treated as a real cosine.
    pub fn embed(&self, coefficient_data: &[Complex64], target: &Basis) -> Result<Vec<Complex64>, SpectralError> {
        assert_eq!(coefficient_data.len(), self.size(), "coefficient data must match basis size");
        let matrix = self.embedding_matrix(target)?;
        let result = matrix * DVector::from_column_slice(coefficient_data);
        Ok(result.as_slice().to_vec())
    }

    pub(crate) fn forward_matrix(&self) -> &DMatrix<Complex64> {
        &self.data.forward
    }

    pub(crate) fn backward_matrix(&self) -> &DMatrix<Complex64> {
        &self.data.backward
    }

    pub(crate) fn derivative_matrix(&self, order: usize) -> Result<DMatrix<Complex64>, SpectralError> {
        if order == 0 {
            return Err(SpectralError::UnsupportedOperation(format!(
                "{self} has no derivative rule of order 0"
            )));
        }
        let mut matrix = self.data.derivative.clone();
        for _ in 1..order {
            matrix = &self.data.derivative * matrix;
        }
        Ok(matrix)
    }

    /// A `1 x size` matrix whose product with coefficients gives the value at `position`.
    pub(crate) fn interpolation_row(&self, position: f64) -> Result<DMatrix<Complex64>, SpectralError> {
        let (a, b) = self.bounds();
        let size = self.size();
        let row = match self.kind() {
            BasisKind::ComplexFourier => fourier::evaluation_row(size, position - a, self.length()),
            kind => {
                let tolerance = 1e-12 * self.length();
                if position < a - tolerance || position > b + tolerance {
                    return Err(SpectralError::UnsupportedOperation(format!(
                        "cannot evaluate {self} at {position}, outside of its bounds ({a}, {b})"
                    )));
                }
                let xi = (2.0 * (position - a) / self.length() - 1.0).clamp(-1.0, 1.0);
                match kind {
                    BasisKind::ChebyshevT => chebyshev::evaluation_row(size, xi),
                    _ => legendre::evaluation_row(size, xi),
                }
            }
        };
        Ok(DMatrix::from_row_slice(1, size, &row))
    }

    /// A `target.size() x self.size()` matrix embedding coefficients into `target`.
    pub(crate) fn embedding_matrix(&self, target: &Basis) -> Result<DMatrix<Complex64>, SpectralError> {
        if !self.is_compatible_with(target) {
            return Err(SpectralError::IncompatibleBasis(format!(
                "cannot convert {self} to {target}"
            )));
        }
        let (from, to) = (self.size(), target.size());
        let weights: Vec<(usize, usize, f64)> = match self.kind() {
            BasisKind::ComplexFourier => fourier::embedding_weights(from, to),
            _ => (0..from.min(to)).map(|n| (n, n, 1.0)).collect(),
        };
        let mut matrix = DMatrix::zeros(to, from);
        for (destination, source, weight) in weights {
            matrix[(destination, source)] += Complex64::new(weight, 0.0);
        }
        Ok(matrix)
    }
}

fn map_grid(native: Vec<f64>, f: impl Fn(f64) -> f64) -> Vec<f64> {
    native.into_iter().map(f).collect()
}

/// Coordinate-wise common basis of two optional bases, where `None` denotes a constant.
pub fn common_optional_basis(a: Option<&Basis>, b: Option<&Basis>) -> Result<Option<Basis>, SpectralError> {
    match (a, b) {
        (None, None) => Ok(None),
        (Some(basis), None) | (None, Some(basis)) => Ok(Some(basis.clone())),
        (Some(a), Some(b)) => a.common_basis(b).map(Some),
    }
}
