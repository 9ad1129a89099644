//! Evaluation on groups of in-process ranks must agree with serial evaluation.
use num::complex::Complex64;
use spectris::basis::Basis;
use spectris::coords::{Coordinate, CoordinateSystem};
use spectris::distributor::Distributor;
use spectris::error::SpectralError;
use spectris::field::{Dtype, Field, SharedField};
use spectris::operators::{add, dot, gradient, interpolate, laplacian, mul, Operand};
use spectris::tensor::TensorSignature;
use spectris_comm::{run_group, Communicator, SelfComm};
use std::sync::Arc;
use util::assert_approx_complex_eq;

fn coords() -> CoordinateSystem {
    CoordinateSystem::cartesian(&["x", "y", "z"]).unwrap()
}

fn bases(c: &CoordinateSystem) -> Vec<Basis> {
    let coords = c.coords();
    vec![
        Basis::complex_fourier(&coords[0], 8, (0.0, 2.0)).unwrap(),
        Basis::complex_fourier(&coords[1], 6, (0.0, 3.0)).unwrap(),
        Basis::chebyshev_t(&coords[2], 7, (-1.0, 1.0)).unwrap(),
    ]
}

fn p0(x: &[f64]) -> Complex64 {
    Complex64::new((3.0 * x[0]).sin() * x[2] + (2.0 * x[1]).cos() * x[2] * x[2], 0.0)
}

fn u0(component: usize, x: &[f64]) -> Complex64 {
    Complex64::new((component as f64 + 1.0) * (x[0] + x[1]).cos() + x[2], 0.0)
}

fn fields(dist: &Arc<Distributor>, c: &CoordinateSystem) -> (SharedField, SharedField) {
    let bases = bases(c);
    let mut p = Field::new(dist, &bases, Dtype::Float64, TensorSignature::scalar()).unwrap();
    p.fill_grid(|_, x| p0(x)).unwrap();
    let mut u = Field::new(dist, &bases, Dtype::Float64, TensorSignature::vector(c)).unwrap();
    u.fill_grid(u0).unwrap();
    (p.into_shared(), u.into_shared())
}

/// The expressions under test, gathered to global buffers.
fn evaluate_all(comm: Arc<dyn Communicator>) -> Result<Vec<Vec<Complex64>>, SpectralError> {
    let c = coords();
    let dist = Arc::new(
        Distributor::builder()
            .with_coordinate_system(&c)
            .with_shared_communicator(comm)
            .build()?,
    );
    let (p, u) = fields(&dist, &c);
    let x: &Coordinate = &c.coords()[0];
    let z: &Coordinate = &c.coords()[2];

    let round_trip = {
        let mut field = p.read().clone();
        field.to_coefficient();
        field.to_grid();
        field
    };
    let expressions = vec![
        gradient(&p, &c)?,
        laplacian(&u, &c)?,
        add(dot(&u, gradient(&u, &c)?)?, mul(&p, &u)?)?,
        interpolate(&p, z, 1.0)?,
        interpolate(&u, x, 0.5)?,
    ];

    let mut results = vec![round_trip.gather_global()];
    for expression in &expressions {
        results.push(expression.evaluate()?.gather_global());
    }
    results.push(Operand::from(&p).evaluate()?.gather_global());
    Ok(results)
}

#[test]
fn distributed_evaluation_matches_serial_evaluation() {
    let serial = evaluate_all(Arc::new(SelfComm)).unwrap();

    for num_ranks in [2, 3] {
        let results = run_group(num_ranks, |comm| {
            assert_eq!(comm.size(), num_ranks);
            evaluate_all(Arc::new(comm)).unwrap()
        });
        for rank_results in results {
            assert_eq!(rank_results.len(), serial.len());
            for (distributed, expected) in rank_results.iter().zip(&serial) {
                assert_approx_complex_eq!(distributed, expected, abstol = 1e-10);
            }
        }
    }
}

#[test]
fn fields_are_distributed_at_rest() {
    let c = coords();
    let results = run_group(2, |comm| {
        let dist = Arc::new(
            Distributor::builder()
                .with_coordinate_system(&c)
                .with_communicator(comm)
                .build()
                .unwrap(),
        );
        let (p, _) = fields(&dist, &c);
        let mut p = p.read().clone();
        assert!(p.layout().is_distributed());
        let before = p.local_shape();
        p.to_coefficient();
        assert_eq!(p.local_shape(), before);

        let x = &c.coords()[0];
        let local_x = p.local_grid(x).unwrap();
        (before, local_x)
    });

    assert_eq!(results[0].0, vec![1, 4, 6, 7]);
    assert_eq!(results[1].0, vec![1, 4, 6, 7]);
    let grid: Vec<f64> = results.iter().flat_map(|(_, x)| x.iter().copied()).collect();
    assert_eq!(grid, bases(&c)[0].grid_points().to_vec());
}
