//! Distributed tensor-valued fields.
use crate::basis::{common_optional_basis, Basis};
use crate::coords::Coordinate;
use crate::distributor::{Distributor, Layout};
use crate::error::SpectralError;
use crate::tensor::TensorSignature;
use crate::util::{apply_along_axis, for_each_multi_index};
use log::warn;
use nalgebra::DMatrix;
use num::complex::Complex64;
use num::Zero;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A field shared between expressions and the code that reads and writes its data.
pub type SharedField = Arc<RwLock<Field>>;

/// Element type of the values a field represents.
///
/// Data is always stored as complex numbers. `Float64` marks fields whose grid values are real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dtype {
    Float64,
    Complex128,
}

impl Dtype {
    /// The dtype able to hold the result of combining `self` with `other`.
    pub fn promote(self, other: Dtype) -> Dtype {
        if self == Dtype::Float64 && other == Dtype::Float64 {
            Dtype::Float64
        } else {
            Dtype::Complex128
        }
    }
}

/// Per-axis data representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Representation {
    Grid,
    Coefficient,
}

/// The bases of a field, one entry per spatial axis of its distributor.
///
/// `None` entries are axes along which the field is constant. A domain without any entries is
/// the domain of a plain number, which has not been assigned to any distributor yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Domain {
    bases: Vec<Option<Basis>>,
}

impl Domain {
    pub fn new(bases: Vec<Option<Basis>>) -> Self {
        Self { bases }
    }

    /// The domain of plain numbers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A domain over `dim` axes without any basis.
    pub fn constant(dim: usize) -> Self {
        Self { bases: vec![None; dim] }
    }

    /// Places each basis on the axis of its coordinate.
    pub fn from_bases(dist: &Distributor, bases: &[Basis]) -> Result<Self, SpectralError> {
        let mut domain = Self::constant(dist.dim());
        for basis in bases {
            let axis = dist.axis_of(basis.coordinate())?;
            if let Some(existing) = &domain.bases[axis] {
                return Err(SpectralError::IncompatibleBasis(format!(
                    "{existing} and {basis} both discretize '{}'",
                    basis.coordinate()
                )));
            }
            domain.bases[axis] = Some(basis.clone());
        }
        Ok(domain)
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.bases.len()
    }

    /// Per-axis bases, including `None` for constant axes.
    pub fn full_bases(&self) -> &[Option<Basis>] {
        &self.bases
    }

    /// The bases that are present, in axis order.
    pub fn bases(&self) -> Vec<&Basis> {
        self.bases.iter().flatten().collect()
    }

    pub fn get(&self, axis: usize) -> Option<&Basis> {
        self.bases.get(axis).and_then(Option::as_ref)
    }

    /// Axis-wise common basis of `self` and `other`.
    pub fn common(&self, other: &Domain) -> Result<Domain, SpectralError> {
        if self.is_empty() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.dim() != other.dim() {
            return Err(SpectralError::IncompatibleBasis(format!(
                "domains over {} and {} axes",
                self.dim(),
                other.dim()
            )));
        }
        let bases = self
            .bases
            .iter()
            .zip(&other.bases)
            .map(|(a, b)| common_optional_basis(a.as_ref(), b.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Domain { bases })
    }

    /// The same domain with the basis on `axis` removed.
    pub fn without(&self, axis: usize) -> Domain {
        let mut bases = self.bases.clone();
        bases[axis] = None;
        Domain { bases }
    }

    /// Checks that data on `self` can be converted onto `target` without discarding an axis.
    pub fn check_convertible_to(&self, target: &Domain) -> Result<(), SpectralError> {
        if self.is_empty() {
            return Ok(());
        }
        if self.dim() != target.dim() {
            return Err(SpectralError::IncompatibleBasis(format!(
                "cannot convert a domain over {} axes to one over {} axes",
                self.dim(),
                target.dim()
            )));
        }
        for (from, to) in self.bases.iter().zip(&target.bases) {
            match (from, to) {
                (Some(from), Some(to)) if !from.is_compatible_with(to) => {
                    return Err(SpectralError::IncompatibleBasis(format!("cannot convert {from} to {to}")));
                }
                (Some(from), None) => {
                    return Err(SpectralError::IncompatibleBasis(format!(
                        "cannot convert {from} to a constant along '{}'",
                        from.coordinate()
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bases: Vec<_> = self.bases().iter().map(|b| b.to_string()).collect();
        write!(f, "({})", bases.join(", "))
    }
}

/// A distributed tensor field over a tuple of bases.
///
/// The local data buffer has shape `[components, n_0, .., n_{d-1}]` in row-major order, where
/// `n_i` is the local extent of spatial axis `i`. Between calls, data is always distributed along
/// the default axis of the field's layout; operations that need a distributed axis to be local
/// transpose temporarily.
#[derive(Debug, Clone)]
pub struct Field {
    name: Option<String>,
    dist: Arc<Distributor>,
    domain: Domain,
    dtype: Dtype,
    tensorsig: TensorSignature,
    layout: Arc<Layout>,
    distributed_axis: Option<usize>,
    representation: Vec<Representation>,
    data: Vec<Complex64>,
}

/// Builder for [`Field`].
#[derive(Debug)]
pub struct FieldBuilder {
    dist: Arc<Distributor>,
    name: Option<String>,
    bases: Vec<Basis>,
    dtype: Dtype,
    tensorsig: TensorSignature,
}

impl FieldBuilder {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_bases(mut self, bases: &[Basis]) -> Self {
        self.bases = bases.to_vec();
        self
    }

    pub fn with_dtype(mut self, dtype: Dtype) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_tensorsig(mut self, tensorsig: TensorSignature) -> Self {
        self.tensorsig = tensorsig;
        self
    }

    pub fn build(self) -> Result<Field, SpectralError> {
        let domain = Domain::from_bases(&self.dist, &self.bases)?;
        let mut field = Field::zeros(&self.dist, domain, self.dtype, self.tensorsig, Representation::Grid);
        field.name = self.name;
        Ok(field)
    }
}

impl Field {
    /// Creates a zero-filled field in grid representation.
    pub fn new(
        dist: &Arc<Distributor>,
        bases: &[Basis],
        dtype: Dtype,
        tensorsig: TensorSignature,
    ) -> Result<Self, SpectralError> {
        Self::builder(dist)
            .with_bases(bases)
            .with_dtype(dtype)
            .with_tensorsig(tensorsig)
            .build()
    }

    pub fn builder(dist: &Arc<Distributor>) -> FieldBuilder {
        FieldBuilder {
            dist: dist.clone(),
            name: None,
            bases: Vec::new(),
            dtype: Dtype::Complex128,
            tensorsig: TensorSignature::scalar(),
        }
    }

    /// A scalar field without any basis, holding `value` everywhere.
    pub fn constant(dist: &Arc<Distributor>, value: Complex64) -> Self {
        let dtype = if value.im == 0.0 { Dtype::Float64 } else { Dtype::Complex128 };
        let mut field = Self::zeros(
            dist,
            Domain::constant(dist.dim()),
            dtype,
            TensorSignature::scalar(),
            Representation::Grid,
        );
        field.data.fill(value);
        field
    }

    pub(crate) fn zeros(
        dist: &Arc<Distributor>,
        domain: Domain,
        dtype: Dtype,
        tensorsig: TensorSignature,
        representation: Representation,
    ) -> Self {
        let layout = dist.get_layout(domain.full_bases());
        let distributed_axis = layout.distributed_axis();
        let len = tensorsig.num_components() * layout.local_shape(distributed_axis).iter().product::<usize>();
        Self {
            name: None,
            dist: dist.clone(),
            representation: vec![representation; domain.dim()],
            domain,
            dtype,
            tensorsig,
            layout,
            distributed_axis,
            data: vec![Complex64::zero(); len],
        }
    }

    /// A field with the same domain, signature and representation as `self`, but new data.
    pub(crate) fn with_data(&self, tensorsig: TensorSignature, dtype: Dtype, data: Vec<Complex64>) -> Self {
        let mut field = Self::zeros(&self.dist, self.domain.clone(), dtype, tensorsig, Representation::Grid);
        assert_eq!(field.data.len(), data.len(), "data does not match field shape");
        field.representation = self.representation.clone();
        field.data = data;
        field
    }

    pub fn into_shared(self) -> SharedField {
        Arc::new(RwLock::new(self))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.dist
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn tensorsig(&self) -> &TensorSignature {
        &self.tensorsig
    }

    pub fn rank(&self) -> usize {
        self.tensorsig.rank()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn representation(&self) -> &[Representation] {
        &self.representation
    }

    fn is_all(&self, representation: Representation) -> bool {
        (0..self.domain.dim()).all(|axis| self.domain.get(axis).is_none() || self.representation[axis] == representation)
    }

    pub fn is_grid(&self) -> bool {
        self.is_all(Representation::Grid)
    }

    pub fn is_coefficient(&self) -> bool {
        self.is_all(Representation::Coefficient)
    }

    /// Local buffer shape, `[components, n_0, .., n_{d-1}]`.
    pub fn local_shape(&self) -> Vec<usize> {
        let mut shape = vec![self.tensorsig.num_components()];
        shape.extend(self.layout.local_shape(self.distributed_axis));
        shape
    }

    /// Global buffer shape, `[components, N_0, .., N_{d-1}]`.
    pub fn global_shape(&self) -> Vec<usize> {
        let mut shape = vec![self.tensorsig.num_components()];
        shape.extend_from_slice(self.layout.global_shape());
        shape
    }

    pub fn grid_data(&self) -> Result<&[Complex64], SpectralError> {
        self.require_all(Representation::Grid)?;
        Ok(&self.data)
    }

    pub fn grid_data_mut(&mut self) -> Result<&mut [Complex64], SpectralError> {
        self.require_all(Representation::Grid)?;
        Ok(&mut self.data)
    }

    pub fn coefficient_data(&self) -> Result<&[Complex64], SpectralError> {
        self.require_all(Representation::Coefficient)?;
        Ok(&self.data)
    }

    pub(crate) fn data(&self) -> &[Complex64] {
        &self.data
    }

    fn require_all(&self, representation: Representation) -> Result<(), SpectralError> {
        if self.is_all(representation) {
            Ok(())
        } else {
            Err(SpectralError::WrongRepresentation(format!(
                "field {} is not fully in {representation:?} representation",
                self.display_name()
            )))
        }
    }

    fn display_name(&self) -> &str {
        self.name().unwrap_or("<unnamed>")
    }

    /// Local grid coordinates along `coord`.
    pub fn local_grid(&self, coord: &Coordinate) -> Result<Vec<f64>, SpectralError> {
        let axis = self.dist.axis_of(coord)?;
        let basis = self.domain.get(axis).ok_or_else(|| {
            SpectralError::BasisNotPresent(format!("field {} has no basis along '{coord}'", self.display_name()))
        })?;
        let range = self.layout.local_range(self.distributed_axis, axis);
        Ok(basis.grid_points()[range].to_vec())
    }

    /// Sets the local grid data from a function of component index and grid position.
    ///
    /// Positions along constant axes are reported as `0.0`.
    pub fn fill_grid(&mut self, f: impl Fn(usize, &[f64]) -> Complex64) -> Result<(), SpectralError> {
        self.require_all(Representation::Grid)?;
        let dim = self.domain.dim();
        let grids: Vec<Vec<f64>> = (0..dim)
            .map(|axis| match self.domain.get(axis) {
                Some(basis) => basis.grid_points()[self.layout.local_range(self.distributed_axis, axis)].to_vec(),
                None => vec![0.0],
            })
            .collect();
        let shape = self.local_shape();
        let mut position = vec![0.0; dim];
        let data = &mut self.data;
        let mut offset = 0;
        for_each_multi_index(&shape, |index| {
            for axis in 0..dim {
                position[axis] = grids[axis][index[axis + 1]];
            }
            data[offset] = f(index[0], &position);
            offset += 1;
        });
        Ok(())
    }

    /// Transforms every axis that is in coefficient representation to grid representation.
    ///
    /// This is a collective operation.
    pub fn to_grid(&mut self) {
        for axis in 0..self.domain.dim() {
            if let Some(basis) = self.domain.get(axis).cloned() {
                if self.representation[axis] == Representation::Coefficient {
                    self.apply_axis_matrix(axis, basis.backward_matrix(), Some(basis.clone()));
                    self.representation[axis] = Representation::Grid;
                }
            }
        }
        self.rest();
    }

    /// Transforms every axis that is in grid representation to coefficient representation.
    ///
    /// This is a collective operation.
    pub fn to_coefficient(&mut self) {
        for axis in (0..self.domain.dim()).rev() {
            if let Some(basis) = self.domain.get(axis).cloned() {
                if self.representation[axis] == Representation::Grid {
                    self.apply_axis_matrix(axis, basis.forward_matrix(), Some(basis.clone()));
                    self.representation[axis] = Representation::Coefficient;
                }
            }
        }
        self.rest();
    }

    pub fn require_representation(&mut self, representation: Representation) {
        match representation {
            Representation::Grid => self.to_grid(),
            Representation::Coefficient => self.to_coefficient(),
        }
    }

    /// Evaluates the field at `coord = position`, removing the basis along `coord`.
    ///
    /// The result is in coefficient representation. This is a collective operation.
    pub fn evaluate_at(&self, coord: &Coordinate, position: f64) -> Result<Field, SpectralError> {
        let axis = self.dist.axis_of(coord)?;
        let basis = self.domain.get(axis).cloned().ok_or_else(|| {
            SpectralError::BasisNotPresent(format!("field {} has no basis along '{coord}'", self.display_name()))
        })?;
        let row = basis.interpolation_row(position)?;
        let mut result = self.clone();
        result.name = None;
        result.to_coefficient();
        result.apply_axis_matrix(axis, &row, None);
        result.rest();
        Ok(result)
    }

    /// The `order`-th partial derivative along `coord`, in coefficient representation.
    ///
    /// Fields without a basis along `coord` are constant along it, so their derivative vanishes.
    /// This is a collective operation.
    pub fn differentiate(&self, coord: &Coordinate, order: usize) -> Result<Field, SpectralError> {
        let axis = self.dist.axis_of(coord)?;
        let mut result = self.clone();
        result.name = None;
        result.to_coefficient();
        match self.domain.get(axis).cloned() {
            Some(basis) => {
                let matrix = basis.derivative_matrix(order)?;
                result.apply_axis_matrix(axis, &matrix, Some(basis));
                result.rest();
            }
            None => {
                if order == 0 {
                    return Err(SpectralError::UnsupportedOperation(
                        "derivatives of order 0 are not defined".to_string(),
                    ));
                }
                result.data.fill(Complex64::zero());
            }
        }
        Ok(result)
    }

    /// Embeds the field into `target`, in coefficient representation.
    ///
    /// Basis-less axes are promoted by placing the constant in the zeroth coefficient. This is
    /// a collective operation.
    pub fn convert_to(&self, target: &Domain) -> Result<Field, SpectralError> {
        self.domain.check_convertible_to(target)?;
        let mut result = self.clone();
        result.to_coefficient();
        for axis in 0..target.dim() {
            match (self.domain.get(axis), target.get(axis)) {
                (Some(from), Some(to)) if from != to => {
                    if to.size() < from.size() {
                        warn!("Truncating {from} to {to}: coefficients beyond the target size are dropped");
                    }
                    let matrix = from.embedding_matrix(to)?;
                    result.apply_axis_matrix(axis, &matrix, Some(to.clone()));
                }
                (None, Some(to)) => {
                    let mut matrix = DMatrix::zeros(to.size(), 1);
                    matrix[(0, 0)] = Complex64::new(1.0, 0.0);
                    result.apply_axis_matrix(axis, &matrix, Some(to.clone()));
                }
                _ => {}
            }
            result.representation[axis] = Representation::Coefficient;
        }
        result.rest();
        Ok(result)
    }

    /// Collects the global data buffer on every rank, in the current representation.
    ///
    /// This is a collective operation.
    pub fn gather_global(&self) -> Vec<Complex64> {
        let components = self.tensorsig.num_components();
        self.layout
            .redistribute(self.dist.comm(), self.data.clone(), components, self.distributed_axis, None)
    }

    /// Applies `matrix` along `axis`, leaving `basis` on that axis.
    ///
    /// Transposes first if `axis` is currently distributed. The data is left in whatever
    /// distribution was used; callers restore the resting distribution with [`Field::rest`].
    fn apply_axis_matrix(&mut self, axis: usize, matrix: &DMatrix<Complex64>, basis: Option<Basis>) {
        let components = self.tensorsig.num_components();
        if self.distributed_axis == Some(axis) {
            let other = self
                .layout
                .alternate_axis(axis)
                .expect("Internal error: distributed layouts always have an alternate axis");
            self.data = self
                .layout
                .transpose(self.dist.comm(), &self.data, components, axis, other);
            self.distributed_axis = Some(other);
        }
        self.data = apply_along_axis(&self.data, &self.local_shape(), axis + 1, matrix);

        let mut bases = self.domain.full_bases().to_vec();
        bases[axis] = basis;
        self.domain = Domain::new(bases);
        let layout = self.dist.get_layout(self.domain.full_bases());
        // The global extent only changed along `axis`, which is local, so the block partition of
        // the current distributed axis is the same in the new layout
        if let Some(current) = self.distributed_axis {
            if !layout.is_distributed() {
                let data = std::mem::take(&mut self.data);
                self.data = layout.redistribute(self.dist.comm(), data, components, Some(current), None);
                self.distributed_axis = None;
            }
        }
        self.layout = layout;
    }

    /// Restores the resting distribution of the current layout.
    fn rest(&mut self) {
        let target = self.layout.distributed_axis();
        if self.distributed_axis != target {
            let components = self.tensorsig.num_components();
            let data = std::mem::take(&mut self.data);
            self.data = self
                .layout
                .redistribute(self.dist.comm(), data, components, self.distributed_axis, target);
            self.distributed_axis = target;
        }
    }
}
