//! The Boussinesq equations for Rayleigh-Benard convection, in `(M, L, F)` form.
use num::complex::Complex64;
use spectris::basis::Basis;
use spectris::coords::CoordinateSystem;
use spectris::distributor::Distributor;
use spectris::field::{Domain, Dtype, Field, SharedField};
use spectris::operators::{add, divergence, dot, gradient, interpolate, laplacian, mul, neg, sub, Scalar};
use spectris::problem::{Equation, Problem};
use spectris::tensor::TensorSignature;
use std::sync::Arc;

const LX: f64 = 4.0;
const LY: f64 = 4.0;
const LZ: f64 = 1.0;
const N: usize = 16;
const PRANDTL: f64 = 1.0;
const RAYLEIGH: f64 = 3000.0;

struct Setup {
    c: CoordinateSystem,
    dist: Arc<Distributor>,
    bases: Vec<Basis>,
}

fn setup() -> Setup {
    let c = CoordinateSystem::cartesian(&["x", "y", "z"]).unwrap();
    let dist = Arc::new(Distributor::new(vec![c.clone()]).unwrap());
    let coords = c.coords();
    let bases = vec![
        Basis::complex_fourier(&coords[0], N, (0.0, LX)).unwrap(),
        Basis::complex_fourier(&coords[1], N, (0.0, LY)).unwrap(),
        Basis::chebyshev_t(&coords[2], N, (0.0, LZ)).unwrap(),
    ];
    Setup { c, dist, bases }
}

fn field(s: &Setup, name: &str, tensorsig: TensorSignature) -> SharedField {
    Field::builder(&s.dist)
        .with_name(name)
        .with_bases(&s.bases)
        .with_dtype(Dtype::Complex128)
        .with_tensorsig(tensorsig)
        .build()
        .unwrap()
        .into_shared()
}

fn build_problem(s: &Setup) -> eyre::Result<Problem> {
    let c = &s.c;
    let z = &c.coords()[2];
    let p = field(s, "p", TensorSignature::scalar());
    let b = field(s, "b", TensorSignature::scalar());
    let u = field(s, "u", TensorSignature::vector(c));
    let ez = field(s, "ez", TensorSignature::vector(c));
    ez.write()
        .fill_grid(|component, _| Complex64::new(if component == 2 { 1.0 } else { 0.0 }, 0.0))?;

    // Some initial data, so that evaluation exercises non-trivial values
    b.write()
        .fill_grid(|_, x| Complex64::new(LZ - x[2] + 1e-3 * (x[0] * x[1]).sin(), 0.0))?;
    u.write()
        .fill_grid(|component, x| Complex64::new(0.1 * (component as f64 + 1.0) * (x[0] + x[2]).cos(), 0.0))?;

    let pp = Scalar::new("P", (RAYLEIGH * PRANDTL).powf(-0.5));
    let rr = Scalar::new("R", (RAYLEIGH / PRANDTL).powf(-0.5));
    let ghat = neg(&ez)?;

    let mut problem = Problem::new(&s.dist, &[p.clone(), b.clone(), u.clone()]);
    problem.add_equation(Equation::new().with_linear(divergence(&u, 0)?))?;
    problem.add_equation(
        Equation::new()
            .with_mass(&b)
            .with_linear(neg(mul(&pp, laplacian(&b, c)?)?)?)
            .with_forcing(neg(dot(&u, gradient(&b, c)?)?)?),
    )?;
    problem.add_equation(
        Equation::new()
            .with_mass(&u)
            .with_linear(add(neg(mul(&rr, laplacian(&u, c)?)?)?, gradient(&p, c)?)?)
            .with_forcing(sub(neg(dot(&u, gradient(&u, c)?)?)?, mul(&b, &ghat)?)?),
    )?;

    problem.add_bc(Equation::new().with_linear(interpolate(&u, z, 0.0)?))?;
    problem.add_bc(Equation::new().with_linear(interpolate(&u, z, LZ)?))?;
    problem.add_bc(
        Equation::new()
            .with_linear(interpolate(&b, z, 0.0)?)
            .with_forcing(LZ),
    )?;
    problem.add_bc(
        Equation::new()
            .with_linear(interpolate(&b, z, LZ)?)
            .with_forcing(0.0),
    )?;
    Ok(problem)
}

#[test]
fn all_entries_evaluate_after_conversion() {
    let s = setup();
    let mut problem = build_problem(&s).unwrap();
    assert_eq!(problem.equations().len(), 3);
    assert_eq!(problem.boundary_conditions().len(), 4);

    problem.apply_conversions().unwrap();
    problem.check_evaluable().unwrap();

    let full = Domain::from_bases(&s.dist, &s.bases).unwrap();
    let boundary = full.without(2);
    for equation in problem.equations() {
        for (label, entry) in equation.entries() {
            let result = entry.evaluate().unwrap();
            assert_eq!(result.domain(), &full, "entry {label} of {entry}");
            assert_eq!(result.tensorsig(), &entry.tensorsig());
        }
    }
    for bc in problem.boundary_conditions() {
        for (label, entry) in bc.entries() {
            let result = entry.evaluate().unwrap();
            assert_eq!(result.domain(), &boundary, "entry {label} of {entry}");
        }
    }
}

#[test]
fn equation_ranks_match_variables() {
    let s = setup();
    let problem = build_problem(&s).unwrap();
    let ranks: Vec<_> = problem
        .equations()
        .iter()
        .map(|eq| eq.linear.as_ref().unwrap().tensorsig().rank())
        .collect();
    assert_eq!(ranks, vec![0, 0, 1]);

    // Temperature boundary conditions are constant along z
    let bc = &problem.boundary_conditions()[2];
    assert!(bc.common_domain().unwrap().get(2).is_none());
}
