//! Equation sets in `(Mass, Linear, Forcing)` form.
//!
//! A [`Problem`] collects the equations and boundary conditions handed to a downstream solver.
//! The solver itself is not part of this crate; what is guaranteed here is that, after
//! [`Problem::apply_conversions`], every entry of an equation lives on the same domain and
//! evaluates without error.
use crate::distributor::Distributor;
use crate::error::SpectralError;
use crate::field::{Domain, SharedField};
use crate::operators::{convert, Operand};
use eyre::WrapErr;
use itertools::Itertools;
use log::debug;
use std::sync::Arc;

/// Condition of equations that apply to every mode.
pub const ALWAYS: &str = "True";

/// A single equation `M(dt(X)) + L(X) = F(X)`, with absent entries stored as `None`.
///
/// The optional condition selects the modes (e.g. `"nx != 0"`) for which a downstream solver
/// imposes the equation. It is stored verbatim and not interpreted here.
#[derive(Debug, Clone, Default)]
pub struct Equation {
    pub mass: Option<Operand>,
    pub linear: Option<Operand>,
    pub forcing: Option<Operand>,
    pub condition: Option<String>,
}

impl Equation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mass(mut self, mass: impl Into<Operand>) -> Self {
        self.mass = Some(mass.into());
        self
    }

    pub fn with_linear(mut self, linear: impl Into<Operand>) -> Self {
        self.linear = Some(linear.into());
        self
    }

    pub fn with_forcing(mut self, forcing: impl Into<Operand>) -> Self {
        self.forcing = Some(forcing.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// The mode condition, [`ALWAYS`] if none was given.
    pub fn condition(&self) -> &str {
        self.condition.as_deref().unwrap_or(ALWAYS)
    }

    /// The present entries, labelled `"M"`, `"L"` and `"F"`.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &Operand)> {
        [("M", &self.mass), ("L", &self.linear), ("F", &self.forcing)]
            .into_iter()
            .filter_map(|(label, entry)| entry.as_ref().map(|entry| (label, entry)))
    }

    fn entries_mut(&mut self) -> impl Iterator<Item = (&'static str, &mut Operand)> {
        [("M", &mut self.mass), ("L", &mut self.linear), ("F", &mut self.forcing)]
            .into_iter()
            .filter_map(|(label, entry)| entry.as_mut().map(|entry| (label, entry)))
    }

    /// Coordinate-wise common domain of all present entries.
    pub fn common_domain(&self) -> Result<Domain, SpectralError> {
        self.entries()
            .try_fold(Domain::empty(), |domain, (_, entry)| domain.common(&entry.domain()))
    }
}

/// The kind of entry list an equation is added to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Equation,
    BoundaryCondition,
}

/// Variables together with the equations and boundary conditions that determine them.
#[derive(Debug)]
pub struct Problem {
    dist: Arc<Distributor>,
    variables: Vec<SharedField>,
    equations: Vec<Equation>,
    bcs: Vec<Equation>,
}

impl Problem {
    pub fn new(dist: &Arc<Distributor>, variables: &[SharedField]) -> Self {
        Self {
            dist: dist.clone(),
            variables: variables.to_vec(),
            equations: Vec::new(),
            bcs: Vec::new(),
        }
    }

    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.dist
    }

    pub fn variables(&self) -> &[SharedField] {
        &self.variables
    }

    pub fn equations(&self) -> &[Equation] {
        &self.equations
    }

    pub fn boundary_conditions(&self) -> &[Equation] {
        &self.bcs
    }

    pub fn add_equation(&mut self, equation: Equation) -> eyre::Result<()> {
        let index = self.equations.len();
        self.check(&equation, Role::Equation)
            .wrap_err_with(|| format!("Cannot add equation {index}"))?;
        debug!("Added equation {index}: {}", describe(&equation));
        self.equations.push(equation);
        Ok(())
    }

    pub fn add_bc(&mut self, bc: Equation) -> eyre::Result<()> {
        let index = self.bcs.len();
        self.check(&bc, Role::BoundaryCondition)
            .wrap_err_with(|| format!("Cannot add boundary condition {index}"))?;
        debug!("Added boundary condition {index}: {}", describe(&bc));
        self.bcs.push(bc);
        Ok(())
    }

    fn check(&self, equation: &Equation, role: Role) -> Result<(), SpectralError> {
        let mut entries = equation.entries().peekable();
        let (_, first) = entries
            .peek()
            .copied()
            .ok_or_else(|| SpectralError::UnsupportedEquation("all entries are absent".to_string()))?;
        let tensorsig = first.tensorsig();

        for (label, entry) in entries {
            if let Some(dist) = entry.distributor() {
                if !Arc::ptr_eq(&dist, &self.dist) {
                    return Err(SpectralError::UnsupportedEquation(format!(
                        "entry {label} is defined on a different distributor"
                    )));
                }
            }
            if entry.tensorsig() != tensorsig {
                return Err(SpectralError::UnsupportedEquation(format!(
                    "entry {label} has tensor signature {}, expected {tensorsig}",
                    entry.tensorsig()
                )));
            }
            if role == Role::BoundaryCondition {
                if let Some(basis) = entry.domain().bases().into_iter().find(|b| !b.kind().is_separable()) {
                    return Err(SpectralError::UnsupportedEquation(format!(
                        "boundary condition entry {label} depends on the coupled basis {basis}"
                    )));
                }
            }
        }
        if equation.condition().trim().is_empty() {
            return Err(SpectralError::UnsupportedEquation("the condition is empty".to_string()));
        }
        self.check_constant_forcing(equation)?;
        // The common domain must exist, otherwise no conversion can reconcile the entries
        equation.common_domain()?;
        Ok(())
    }

    /// Rejects forcing that varies along an axis on which the left-hand side is constant.
    fn check_constant_forcing(&self, equation: &Equation) -> Result<(), SpectralError> {
        let lhs: Vec<_> = [&equation.mass, &equation.linear]
            .into_iter()
            .flatten()
            .map(Operand::domain)
            .collect();
        let forcing = match &equation.forcing {
            Some(forcing) if !lhs.is_empty() => forcing.domain(),
            _ => return Ok(()),
        };
        for (axis, coord) in self.dist.coords().iter().enumerate() {
            let lhs_constant = lhs.iter().all(|domain| domain.get(axis).is_none());
            if lhs_constant && forcing.get(axis).is_some() {
                return Err(SpectralError::UnsupportedEquation(format!(
                    "the left-hand side is constant along '{coord}' but the forcing is not"
                )));
            }
        }
        Ok(())
    }

    /// Converts every present entry onto the common domain of its equation.
    ///
    /// Numbers and scalars are first cast into constant fields. Equations whose entries are all
    /// constants are placed on the basis-less domain of the distributor.
    pub fn apply_conversions(&mut self) -> eyre::Result<()> {
        let dist = self.dist.clone();
        for (role, equations) in [("equation", &mut self.equations), ("boundary condition", &mut self.bcs)] {
            for (index, equation) in equations.iter_mut().enumerate() {
                convert_equation(&dist, equation).wrap_err_with(|| format!("Failed to convert {role} {index}"))?;
            }
        }
        Ok(())
    }

    /// Evaluates every present entry of every equation and boundary condition.
    ///
    /// Succeeds only if all entries evaluate and each equation's entries end up on one domain.
    /// This is a collective operation.
    pub fn check_evaluable(&self) -> eyre::Result<()> {
        for (role, equations) in [("equation", &self.equations), ("boundary condition", &self.bcs)] {
            for (index, equation) in equations.iter().enumerate() {
                let expected = equation.common_domain()?;
                for (label, entry) in equation.entries() {
                    let field = entry
                        .evaluate()
                        .wrap_err_with(|| format!("Failed to evaluate entry {label} of {role} {index}"))?;
                    if !expected.is_empty() && *field.domain() != expected {
                        return Err(SpectralError::UnsupportedEquation(format!(
                            "entry {label} of {role} {index} evaluates on {}, expected {expected}",
                            field.domain()
                        ))
                        .into());
                    }
                }
            }
        }
        Ok(())
    }
}

fn convert_equation(dist: &Arc<Distributor>, equation: &mut Equation) -> Result<(), SpectralError> {
    let mut domain = equation.common_domain()?;
    if domain.is_empty() {
        domain = Domain::constant(dist.dim());
    }
    for (label, entry) in equation.entries_mut() {
        let cast = Operand::cast(entry.clone(), dist);
        *entry = convert(cast, &domain)?;
        debug!("Converted entry {label} onto {domain}");
    }
    Ok(())
}

fn describe(equation: &Equation) -> String {
    let entries = [&equation.mass, &equation.linear, &equation.forcing]
        .iter()
        .map(|entry| match entry {
            Some(entry) => entry.to_string(),
            None => "0".to_string(),
        })
        .join(" | ");
    format!("{entries} if {}", equation.condition())
}
