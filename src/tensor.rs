//! Tensor signatures and component bookkeeping.
//!
//! Field data stores all tensor components of a field contiguously, one spatial block per
//! component, with components ordered row-major over the tensor slots (the last slot varies
//! fastest).
use crate::coords::CoordinateSystem;
use crate::error::SpectralError;
use std::fmt;

/// The rank of a tensor field and the coordinate system of each of its slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TensorSignature {
    slots: Vec<CoordinateSystem>,
}

impl TensorSignature {
    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn vector(coords: &CoordinateSystem) -> Self {
        Self {
            slots: vec![coords.clone()],
        }
    }

    pub fn new(slots: Vec<CoordinateSystem>) -> Self {
        Self { slots }
    }

    pub fn rank(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[CoordinateSystem] {
        &self.slots
    }

    /// Number of components, i.e. the product of the slot dimensions.
    pub fn num_components(&self) -> usize {
        self.slots.iter().map(CoordinateSystem::axis_count).product()
    }

    /// Signature with `coords` prepended as the new first slot.
    pub fn prepend(&self, coords: &CoordinateSystem) -> Self {
        let mut slots = Vec::with_capacity(self.rank() + 1);
        slots.push(coords.clone());
        slots.extend(self.slots.iter().cloned());
        Self { slots }
    }

    /// Signature with the slot at `index` removed.
    pub fn without(&self, index: usize) -> Self {
        let mut slots = self.slots.clone();
        slots.remove(index);
        Self { slots }
    }

    /// Signature of the outer product `self ⊗ other`.
    pub fn outer(&self, other: &TensorSignature) -> Self {
        let mut slots = self.slots.clone();
        slots.extend(other.slots.iter().cloned());
        Self { slots }
    }

    /// Signature of contracting the last slot of `self` with the first slot of `other`.
    pub fn contract(&self, other: &TensorSignature) -> Result<Self, SpectralError> {
        match (self.slots.last(), other.slots.first()) {
            (Some(a), Some(b)) if a == b => {
                let mut slots = self.slots[..self.rank() - 1].to_vec();
                slots.extend(other.slots[1..].iter().cloned());
                Ok(Self { slots })
            }
            (Some(a), Some(b)) => Err(SpectralError::TensorMismatch(format!(
                "cannot contract a slot over {a} with a slot over {b}"
            ))),
            _ => Err(SpectralError::TensorMismatch(format!(
                "contraction requires operands of rank >= 1, got ranks {} and {}",
                self.rank(),
                other.rank()
            ))),
        }
    }

    /// Flat component indices of `self` whose slot `index` takes the value `value`, ordered
    /// like the components of `self.without(index)`.
    pub(crate) fn components_with(&self, index: usize, value: usize) -> Vec<usize> {
        let dims: Vec<usize> = self.slots.iter().map(CoordinateSystem::axis_count).collect();
        let reduced = self.without(index).num_components();
        let inner: usize = dims[index + 1..].iter().product();
        let n = dims[index];
        (0..reduced)
            .map(|r| {
                let (outer, rest) = (r / inner, r % inner);
                (outer * n + value) * inner + rest
            })
            .collect()
    }
}

impl fmt::Display for TensorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: Vec<_> = self.slots.iter().map(|s| s.to_string()).collect();
        write!(f, "[{}]", slots.join(", "))
    }
}
