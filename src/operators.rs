//! Lazy operator expressions over fields.
//!
//! Expressions are trees of [`Operand`]s. Leaves are numbers, named scalars and shared fields;
//! inner nodes are [`OperatorNode`]s from a closed set of [`OperatorKind`]s. The domain (bases)
//! and tensor signature of every node are inferred when it is constructed, so that malformed
//! expressions are rejected before any data is touched, and never change afterwards.
//!
//! Constructors are free functions, e.g.
//!
//! ```rust
//! # use spectris::coords::CoordinateSystem;
//! # use spectris::basis::Basis;
//! # use spectris::distributor::Distributor;
//! # use spectris::field::{Dtype, Field};
//! # use spectris::tensor::TensorSignature;
//! # use spectris::operators::{add, gradient, laplacian, mul};
//! # use std::sync::Arc;
//! # fn main() -> Result<(), spectris::error::SpectralError> {
//! let c = CoordinateSystem::cartesian(&["x", "z"])?;
//! let dist = Arc::new(Distributor::new(vec![c.clone()])?);
//! let xb = Basis::complex_fourier(&c.coords()[0], 8, (0.0, 1.0))?;
//! let zb = Basis::chebyshev_t(&c.coords()[1], 8, (0.0, 1.0))?;
//! let p = Field::new(&dist, &[xb, zb], Dtype::Float64, TensorSignature::scalar())?.into_shared();
//! let expr = add(mul(-0.5, laplacian(&p, &c)?)?, &p)?;
//! let grad_p = gradient(&p, &c)?;
//! assert_eq!(expr.tensorsig().rank(), 0);
//! assert_eq!(grad_p.tensorsig().rank(), 1);
//! # Ok(())
//! # }
//! ```
use crate::coords::{Coordinate, CoordinateSystem};
use crate::distributor::Distributor;
use crate::error::SpectralError;
use crate::evaluate::Evaluator;
use crate::field::{Domain, Dtype, Field, SharedField};
use crate::tensor::TensorSignature;
use num::complex::Complex64;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

mod conversion;

pub use conversion::{apply_conversions, convert};

/// A named constant, typically a problem parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    name: String,
    value: Complex64,
}

impl Scalar {
    pub fn new(name: impl Into<String>, value: impl Into<Complex64>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Complex64 {
        self.value
    }
}

/// Anything that can take part in an expression.
#[derive(Debug, Clone)]
pub enum Operand {
    /// An anonymous constant.
    Number(Complex64),
    /// A named constant.
    Scalar(Scalar),
    /// A reference to a field.
    Field(SharedField),
    /// A lazy operator expression.
    Operator(Arc<OperatorNode>),
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Self::Number(value.into())
    }
}

impl From<Complex64> for Operand {
    fn from(value: Complex64) -> Self {
        Self::Number(value)
    }
}

impl From<Scalar> for Operand {
    fn from(scalar: Scalar) -> Self {
        Self::Scalar(scalar)
    }
}

impl From<&Scalar> for Operand {
    fn from(scalar: &Scalar) -> Self {
        Self::Scalar(scalar.clone())
    }
}

impl From<SharedField> for Operand {
    fn from(field: SharedField) -> Self {
        Self::Field(field)
    }
}

impl From<&SharedField> for Operand {
    fn from(field: &SharedField) -> Self {
        Self::Field(field.clone())
    }
}

impl From<&Operand> for Operand {
    fn from(operand: &Operand) -> Self {
        operand.clone()
    }
}

impl Operand {
    /// Turns numbers and scalars into constant fields on `dist`. Other operands are returned
    /// unchanged.
    pub fn cast(operand: impl Into<Operand>, dist: &Arc<Distributor>) -> Operand {
        let operand = operand.into();
        match &operand {
            Operand::Number(value) => Operand::Field(Field::constant(dist, *value).into_shared()),
            Operand::Scalar(scalar) => {
                let mut field = Field::constant(dist, scalar.value());
                field.set_name(scalar.name());
                Operand::Field(field.into_shared())
            }
            _ => operand,
        }
    }

    /// The value of numbers and scalars.
    pub fn constant_value(&self) -> Option<Complex64> {
        match self {
            Operand::Number(value) => Some(*value),
            Operand::Scalar(scalar) => Some(scalar.value()),
            _ => None,
        }
    }

    pub fn is_constant_value(&self) -> bool {
        self.constant_value().is_some()
    }

    /// The bases of the operand. Numbers and scalars have the empty domain.
    pub fn domain(&self) -> Domain {
        match self {
            Operand::Number(_) | Operand::Scalar(_) => Domain::empty(),
            Operand::Field(field) => field.read().domain().clone(),
            Operand::Operator(node) => node.domain().clone(),
        }
    }

    pub fn tensorsig(&self) -> TensorSignature {
        match self {
            Operand::Number(_) | Operand::Scalar(_) => TensorSignature::scalar(),
            Operand::Field(field) => field.read().tensorsig().clone(),
            Operand::Operator(node) => node.tensorsig().clone(),
        }
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            Operand::Number(value) => real_or_complex(*value),
            Operand::Scalar(scalar) => real_or_complex(scalar.value()),
            Operand::Field(field) => field.read().dtype(),
            Operand::Operator(node) => node.dtype(),
        }
    }

    pub fn distributor(&self) -> Option<Arc<Distributor>> {
        match self {
            Operand::Number(_) | Operand::Scalar(_) => None,
            Operand::Field(field) => Some(field.read().distributor().clone()),
            Operand::Operator(node) => node.distributor().cloned(),
        }
    }

    /// Whether both operands are the very same object (or equal constants).
    pub fn ptr_eq(&self, other: &Operand) -> bool {
        match (self, other) {
            (Operand::Number(a), Operand::Number(b)) => a == b,
            (Operand::Scalar(a), Operand::Scalar(b)) => a == b,
            (Operand::Field(a), Operand::Field(b)) => Arc::ptr_eq(a, b),
            (Operand::Operator(a), Operand::Operator(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Boundary evaluation, `u(coord = position)`.
    pub fn at(&self, coord: &Coordinate, position: f64) -> Result<Operand, SpectralError> {
        interpolate(self, coord, position)
    }

    /// Converts and evaluates the expression into a new field.
    ///
    /// This is a collective operation when the distributor spans several ranks.
    pub fn evaluate(&self) -> Result<Field, SpectralError> {
        Evaluator::new().evaluate(self)
    }
}

fn real_or_complex(value: Complex64) -> Dtype {
    if value.im == 0.0 {
        Dtype::Float64
    } else {
        Dtype::Complex128
    }
}

/// Identity of an operator node, used to memoize results within one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        NodeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The closed set of operators.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorKind {
    Add,
    /// Scalar scaling if either operand is a constant, otherwise the (outer) product of fields.
    Multiply,
    Negate,
    /// Partial derivative of the given order.
    Differentiate { coord: Coordinate, order: usize },
    /// Prepends a slot over `coords`: `grad(f)_{i..} = d_i f_{..}`.
    Gradient { coords: CoordinateSystem },
    /// Contracts slot `index` with the derivative.
    Divergence { index: usize },
    Laplacian { coords: CoordinateSystem },
    /// Contracts the last slot of the left operand with the first slot of the right operand.
    DotProduct,
    /// Boundary evaluation at a fixed coordinate value.
    Interpolate { coord: Coordinate, position: f64 },
    /// Explicit promotion onto a target domain.
    Convert { target: Domain },
}

impl OperatorKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add => "Add",
            Self::Multiply => "Multiply",
            Self::Negate => "Negate",
            Self::Differentiate { .. } => "Differentiate",
            Self::Gradient { .. } => "Gradient",
            Self::Divergence { .. } => "Divergence",
            Self::Laplacian { .. } => "Laplacian",
            Self::DotProduct => "DotProduct",
            Self::Interpolate { .. } => "Interpolate",
            Self::Convert { .. } => "Convert",
        }
    }

    /// Whether the node requires all its arguments on one common domain.
    pub fn merges_domains(&self) -> bool {
        matches!(self, Self::Add | Self::Multiply | Self::DotProduct)
    }
}

/// An operator applied to its arguments, with its inferred domain and tensor signature.
#[derive(Debug)]
pub struct OperatorNode {
    id: NodeId,
    kind: OperatorKind,
    args: Vec<Operand>,
    domain: Domain,
    tensorsig: TensorSignature,
    dtype: Dtype,
    dist: Option<Arc<Distributor>>,
}

impl OperatorNode {
    /// Validates the arguments of `kind` and infers the resulting shape.
    ///
    /// `dist` is only used if none of the arguments carries a distributor.
    pub(crate) fn new(
        kind: OperatorKind,
        args: Vec<Operand>,
        dist: Option<Arc<Distributor>>,
    ) -> Result<Self, SpectralError> {
        let dist = common_distributor(&args)?.or(dist);
        let (domain, tensorsig) = infer_shape(&kind, &args, dist.as_deref())?;
        let dtype = args
            .iter()
            .map(Operand::dtype)
            .fold(Dtype::Float64, Dtype::promote);
        Ok(Self {
            id: NodeId::next(),
            kind,
            args,
            domain,
            tensorsig,
            dtype,
            dist,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &OperatorKind {
        &self.kind
    }

    pub fn args(&self) -> &[Operand] {
        &self.args
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn tensorsig(&self) -> &TensorSignature {
        &self.tensorsig
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn distributor(&self) -> Option<&Arc<Distributor>> {
        self.dist.as_ref()
    }
}

fn common_distributor(args: &[Operand]) -> Result<Option<Arc<Distributor>>, SpectralError> {
    let mut dist: Option<Arc<Distributor>> = None;
    for arg_dist in args.iter().filter_map(Operand::distributor) {
        match &dist {
            Some(existing) if !Arc::ptr_eq(existing, &arg_dist) => {
                return Err(SpectralError::IncompatibleBasis(
                    "operands are defined on different distributors".to_string(),
                ));
            }
            Some(_) => {}
            None => dist = Some(arg_dist),
        }
    }
    Ok(dist)
}

fn require_field_like(kind: &OperatorKind, arg: &Operand) -> Result<(), SpectralError> {
    if arg.is_constant_value() {
        Err(SpectralError::UnsupportedOperation(format!(
            "{} of a constant operand; cast it to a field first",
            kind.name()
        )))
    } else {
        Ok(())
    }
}

fn require_coords(dist: Option<&Distributor>, coords: &[Coordinate]) -> Result<(), SpectralError> {
    if let Some(dist) = dist {
        for coord in coords {
            dist.axis_of(coord)?;
        }
    }
    Ok(())
}

fn infer_shape(
    kind: &OperatorKind,
    args: &[Operand],
    dist: Option<&Distributor>,
) -> Result<(Domain, TensorSignature), SpectralError> {
    let expected_args = match kind {
        OperatorKind::Add | OperatorKind::Multiply | OperatorKind::DotProduct => 2,
        _ => 1,
    };
    assert_eq!(args.len(), expected_args, "{} takes {expected_args} argument(s)", kind.name());

    match kind {
        OperatorKind::Add => {
            let (a, b) = (args[0].tensorsig(), args[1].tensorsig());
            if a != b {
                return Err(SpectralError::TensorMismatch(format!("cannot add tensors {a} and {b}")));
            }
            Ok((args[0].domain().common(&args[1].domain())?, a))
        }
        OperatorKind::Multiply => {
            let tensorsig = args[0].tensorsig().outer(&args[1].tensorsig());
            Ok((args[0].domain().common(&args[1].domain())?, tensorsig))
        }
        OperatorKind::DotProduct => {
            for arg in args {
                require_field_like(kind, arg)?;
            }
            let tensorsig = args[0].tensorsig().contract(&args[1].tensorsig())?;
            Ok((args[0].domain().common(&args[1].domain())?, tensorsig))
        }
        OperatorKind::Negate => Ok((args[0].domain(), args[0].tensorsig())),
        OperatorKind::Differentiate { coord, .. } => {
            require_field_like(kind, &args[0])?;
            require_coords(dist, std::slice::from_ref(coord))?;
            Ok((args[0].domain(), args[0].tensorsig()))
        }
        OperatorKind::Gradient { coords } => {
            require_field_like(kind, &args[0])?;
            require_coords(dist, coords.coords())?;
            Ok((args[0].domain(), args[0].tensorsig().prepend(coords)))
        }
        OperatorKind::Laplacian { coords } => {
            require_field_like(kind, &args[0])?;
            require_coords(dist, coords.coords())?;
            Ok((args[0].domain(), args[0].tensorsig()))
        }
        OperatorKind::Divergence { index } => {
            require_field_like(kind, &args[0])?;
            let tensorsig = args[0].tensorsig();
            if *index >= tensorsig.rank() {
                return Err(SpectralError::TensorMismatch(format!(
                    "divergence over index {index} of a tensor of rank {}",
                    tensorsig.rank()
                )));
            }
            require_coords(dist, tensorsig.slots()[*index].coords())?;
            Ok((args[0].domain(), tensorsig.without(*index)))
        }
        OperatorKind::Interpolate { coord, position } => {
            require_field_like(kind, &args[0])?;
            let dist = dist.ok_or_else(|| {
                SpectralError::UnsupportedOperation("interpolation requires a distributed operand".to_string())
            })?;
            let axis = dist.axis_of(coord)?;
            let domain = args[0].domain();
            let basis = domain
                .get(axis)
                .ok_or_else(|| SpectralError::BasisNotPresent(format!("operand has no basis along '{coord}'")))?;
            basis.interpolation_row(*position)?;
            Ok((domain.without(axis), args[0].tensorsig()))
        }
        OperatorKind::Convert { target } => {
            args[0].domain().check_convertible_to(target)?;
            Ok((target.clone(), args[0].tensorsig()))
        }
    }
}

fn fold_or_build(kind: OperatorKind, args: Vec<Operand>) -> Result<Operand, SpectralError> {
    let values: Option<Vec<Complex64>> = args.iter().map(Operand::constant_value).collect();
    if let Some(values) = values {
        let folded = match kind {
            OperatorKind::Add => Some(values[0] + values[1]),
            OperatorKind::Multiply => Some(values[0] * values[1]),
            OperatorKind::Negate => Some(-values[0]),
            _ => None,
        };
        if let Some(value) = folded {
            return Ok(Operand::Number(value));
        }
    }
    Ok(Operand::Operator(Arc::new(OperatorNode::new(kind, args, None)?)))
}

pub fn add(a: impl Into<Operand>, b: impl Into<Operand>) -> Result<Operand, SpectralError> {
    fold_or_build(OperatorKind::Add, vec![a.into(), b.into()])
}

/// `a - b`, expressed as `a + (-b)`.
pub fn sub(a: impl Into<Operand>, b: impl Into<Operand>) -> Result<Operand, SpectralError> {
    add(a, neg(b)?)
}

pub fn mul(a: impl Into<Operand>, b: impl Into<Operand>) -> Result<Operand, SpectralError> {
    fold_or_build(OperatorKind::Multiply, vec![a.into(), b.into()])
}

pub fn neg(a: impl Into<Operand>) -> Result<Operand, SpectralError> {
    fold_or_build(OperatorKind::Negate, vec![a.into()])
}

pub fn differentiate(a: impl Into<Operand>, coord: &Coordinate, order: usize) -> Result<Operand, SpectralError> {
    let kind = OperatorKind::Differentiate {
        coord: coord.clone(),
        order,
    };
    fold_or_build(kind, vec![a.into()])
}

pub fn gradient(a: impl Into<Operand>, coords: &CoordinateSystem) -> Result<Operand, SpectralError> {
    let kind = OperatorKind::Gradient { coords: coords.clone() };
    fold_or_build(kind, vec![a.into()])
}

/// Divergence over tensor slot `index`.
pub fn divergence(a: impl Into<Operand>, index: usize) -> Result<Operand, SpectralError> {
    fold_or_build(OperatorKind::Divergence { index }, vec![a.into()])
}

pub fn laplacian(a: impl Into<Operand>, coords: &CoordinateSystem) -> Result<Operand, SpectralError> {
    let kind = OperatorKind::Laplacian { coords: coords.clone() };
    fold_or_build(kind, vec![a.into()])
}

pub fn dot(a: impl Into<Operand>, b: impl Into<Operand>) -> Result<Operand, SpectralError> {
    fold_or_build(OperatorKind::DotProduct, vec![a.into(), b.into()])
}

/// Evaluation at `coord = position`, which removes the basis along `coord`.
pub fn interpolate(a: impl Into<Operand>, coord: &Coordinate, position: f64) -> Result<Operand, SpectralError> {
    let kind = OperatorKind::Interpolate {
        coord: coord.clone(),
        position,
    };
    fold_or_build(kind, vec![a.into()])
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Number(value) if value.im == 0.0 => write!(f, "{}", value.re),
            Operand::Number(value) => write!(f, "({value})"),
            Operand::Scalar(scalar) => write!(f, "{}", scalar.name()),
            Operand::Field(field) => write!(f, "{}", field.read().name().unwrap_or("<field>")),
            Operand::Operator(node) => write!(f, "{node}"),
        }
    }
}

impl fmt::Display for OperatorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = &self.args;
        match &self.kind {
            OperatorKind::Add => write!(f, "({} + {})", args[0], args[1]),
            OperatorKind::Multiply => write!(f, "{}*{}", args[0], args[1]),
            OperatorKind::Negate => write!(f, "-{}", args[0]),
            OperatorKind::Differentiate { coord, order: 1 } => write!(f, "d{coord}({})", args[0]),
            OperatorKind::Differentiate { coord, order } => write!(f, "d{coord}^{order}({})", args[0]),
            OperatorKind::Gradient { .. } => write!(f, "grad({})", args[0]),
            OperatorKind::Divergence { .. } => write!(f, "div({})", args[0]),
            OperatorKind::Laplacian { .. } => write!(f, "lap({})", args[0]),
            OperatorKind::DotProduct => write!(f, "dot({}, {})", args[0], args[1]),
            OperatorKind::Interpolate { coord, position } => write!(f, "{}({coord}={position})", args[0]),
            OperatorKind::Convert { target } => write!(f, "convert({}, {target})", args[0]),
        }
    }
}
