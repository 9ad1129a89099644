//! Library-wide error type.
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Errors raised while constructing, converting or evaluating spectral expressions.
///
/// None of these are transient: they indicate a malformed coordinate system or an equation that
/// cannot be discretized as written. Failures of the collective communication layer are not
/// represented here, since they are fatal for the whole process group.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SpectralError {
    /// Duplicate or malformed coordinate names.
    InvalidCoordinateSystem(String),
    /// Bases that differ in kind or coordinate in a way no conversion can reconcile.
    IncompatibleBasis(String),
    /// An operation was requested along a coordinate the field does not discretize.
    BasisNotPresent(String),
    /// An operator or derivative order that is not defined for the given basis or operand.
    UnsupportedOperation(String),
    /// Tensor signatures that do not satisfy the requirements of an operator.
    TensorMismatch(String),
    /// Data access in a representation the field is not currently in.
    WrongRepresentation(String),
    /// An equation or boundary condition that violates the problem-level requirements.
    UnsupportedEquation(String),
    /// A failure inside the evaluation of an operator node.
    EvaluationError {
        /// Name of the failing operator.
        operator: String,
        /// The originating error.
        source: Box<SpectralError>,
    },
}

impl SpectralError {
    /// Wraps `self` in an [`SpectralError::EvaluationError`] for the given operator.
    ///
    /// Errors that already are evaluation errors are returned unchanged, so that the reported
    /// operator is always the innermost failing node.
    pub fn during_evaluation_of(self, operator: &str) -> Self {
        match self {
            Self::EvaluationError { .. } => self,
            other => Self::EvaluationError {
                operator: operator.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Returns the innermost non-evaluation error.
    pub fn root_cause(&self) -> &SpectralError {
        match self {
            Self::EvaluationError { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl Display for SpectralError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCoordinateSystem(msg) => write!(f, "Invalid coordinate system: {msg}"),
            Self::IncompatibleBasis(msg) => write!(f, "Incompatible bases: {msg}"),
            Self::BasisNotPresent(msg) => write!(f, "Basis not present: {msg}"),
            Self::UnsupportedOperation(msg) => write!(f, "Unsupported operation: {msg}"),
            Self::TensorMismatch(msg) => write!(f, "Tensor signature mismatch: {msg}"),
            Self::WrongRepresentation(msg) => write!(f, "Wrong representation: {msg}"),
            Self::UnsupportedEquation(msg) => write!(f, "Unsupported equation: {msg}"),
            Self::EvaluationError { operator, source } => {
                write!(f, "Failed to evaluate {operator}: {source}")
            }
        }
    }
}

impl Error for SpectralError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::EvaluationError { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
