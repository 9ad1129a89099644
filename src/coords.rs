//! Coordinates and coordinate systems.
use crate::error::SpectralError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single named coordinate, identified by its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    name: String,
}

impl Coordinate {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// An ordered set of named coordinate axes.
///
/// Coordinate systems are immutable and compared by their axis names. A coordinate system also
/// serves as the index space of one tensor slot: a vector field over a three-dimensional system
/// has three components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoordinateSystem {
    coords: Vec<Coordinate>,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl CoordinateSystem {
    /// Creates a coordinate system from an ordered list of distinct axis names.
    pub fn new<I, S>(names: I) -> Result<Self, SpectralError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut coords: Vec<Coordinate> = Vec::new();
        for name in names {
            let name = name.into();
            if !is_identifier(&name) {
                return Err(SpectralError::InvalidCoordinateSystem(format!(
                    "'{name}' is not a valid coordinate name"
                )));
            }
            if coords.iter().any(|c| c.name == name) {
                return Err(SpectralError::InvalidCoordinateSystem(format!(
                    "coordinate name '{name}' is used multiple times"
                )));
            }
            coords.push(Coordinate { name });
        }
        if coords.is_empty() {
            return Err(SpectralError::InvalidCoordinateSystem(
                "a coordinate system needs at least one axis".to_string(),
            ));
        }
        Ok(Self { coords })
    }

    /// Convenience constructor for a Cartesian system, e.g. `cartesian(&["x", "y", "z"])`.
    pub fn cartesian(names: &[&str]) -> Result<Self, SpectralError> {
        Self::new(names.iter().copied())
    }

    pub fn axis_count(&self) -> usize {
        self.coords.len()
    }

    pub fn axis_index(&self, name: &str) -> Option<usize> {
        self.coords.iter().position(|c| c.name == name)
    }

    pub fn coords(&self) -> &[Coordinate] {
        &self.coords
    }

    /// Looks up a coordinate by name.
    pub fn coord(&self, name: &str) -> Result<&Coordinate, SpectralError> {
        self.coords.iter().find(|c| c.name == name).ok_or_else(|| {
            SpectralError::BasisNotPresent(format!("no coordinate named '{name}' in {self}"))
        })
    }

    pub fn contains(&self, coord: &Coordinate) -> bool {
        self.coords.contains(coord)
    }
}

impl fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.coords.iter().map(|c| c.name.as_str()).collect();
        write!(f, "({})", names.join(", "))
    }
}
