use num::complex::Complex64;
use proptest::prelude::*;
use spectris::basis::Basis;
use spectris::coords::CoordinateSystem;
use spectris::distributor::Distributor;
use spectris::error::SpectralError;
use spectris::evaluate::Evaluator;
use spectris::field::{Dtype, Field, SharedField};
use spectris::operators::{add, differentiate, divergence, dot, gradient, interpolate, laplacian, mul, sub, Operand, Scalar};
use spectris::proptest::complex_vec;
use spectris::tensor::TensorSignature;
use std::sync::Arc;
use util::assert_approx_complex_eq;

struct Setup {
    c: CoordinateSystem,
    dist: Arc<Distributor>,
    xb: Basis,
    zb: Basis,
}

fn setup() -> Setup {
    let c = CoordinateSystem::cartesian(&["x", "z"]).unwrap();
    let dist = Arc::new(Distributor::new(vec![c.clone()]).unwrap());
    Setup {
        xb: Basis::complex_fourier(&c.coords()[0], 8, (0.0, 2.0 * std::f64::consts::PI)).unwrap(),
        zb: Basis::chebyshev_t(&c.coords()[1], 8, (0.0, 1.0)).unwrap(),
        c,
        dist,
    }
}

fn real(value: f64) -> Complex64 {
    Complex64::new(value, 0.0)
}

/// A field over `(xb, zb)` with component `i` set to `f(i, x, z)`.
fn field(s: &Setup, tensorsig: TensorSignature, f: impl Fn(usize, f64, f64) -> f64) -> SharedField {
    let mut field = Field::new(&s.dist, &[s.xb.clone(), s.zb.clone()], Dtype::Float64, tensorsig).unwrap();
    field.fill_grid(|i, x| real(f(i, x[0], x[1]))).unwrap();
    field.into_shared()
}

fn scalar_field(s: &Setup, f: impl Fn(f64, f64) -> f64) -> SharedField {
    field(s, TensorSignature::scalar(), |_, x, z| f(x, z))
}

fn grid_values(mut field: Field) -> Vec<Complex64> {
    field.to_grid();
    field.grid_data().unwrap().to_vec()
}

fn expected(s: &Setup, components: usize, f: impl Fn(usize, f64, f64) -> f64) -> Vec<Complex64> {
    let sig = if components == 1 {
        TensorSignature::scalar()
    } else {
        TensorSignature::vector(&s.c)
    };
    let field = field(s, sig, f);
    let data = field.read().grid_data().unwrap().to_vec();
    data
}

#[test]
fn laplacian_of_smooth_field() {
    let s = setup();
    let p = scalar_field(&s, |x, z| x.sin() * z * z);
    let result = laplacian(&p, &s.c).unwrap().evaluate().unwrap();
    assert!(result.is_coefficient());
    let expected = expected(&s, 1, |_, x, z| -x.sin() * z * z + 2.0 * x.sin());
    assert_approx_complex_eq!(grid_values(result), expected, abstol = 1e-10);
}

#[test]
fn gradient_and_divergence_of_smooth_fields() {
    let s = setup();
    let p = scalar_field(&s, |x, z| x.sin() * z * z);
    let grad = gradient(&p, &s.c).unwrap().evaluate().unwrap();
    assert_eq!(grad.global_shape(), vec![2, 8, 8]);
    let expected_grad = expected(&s, 2, |i, x, z| match i {
        0 => x.cos() * z * z,
        _ => 2.0 * z * x.sin(),
    });
    assert_approx_complex_eq!(grid_values(grad), expected_grad, abstol = 1e-10);

    let u = field(&s, TensorSignature::vector(&s.c), |i, x, z| match i {
        0 => x.sin(),
        _ => z * z,
    });
    let div = divergence(&u, 0).unwrap().evaluate().unwrap();
    assert_eq!(div.rank(), 0);
    let expected_div = expected(&s, 1, |_, x, z| x.cos() + 2.0 * z);
    assert_approx_complex_eq!(grid_values(div), expected_div, abstol = 1e-10);
}

#[test]
fn products_are_formed_in_grid_space() {
    let s = setup();
    let p = scalar_field(&s, |x, z| x.sin() * z * z);
    let u = field(&s, TensorSignature::vector(&s.c), |i, x, z| match i {
        0 => x.sin(),
        _ => z * z,
    });
    let ez = field(&s, TensorSignature::vector(&s.c), |i, _, _| i as f64);

    let advection = dot(&u, gradient(&p, &s.c).unwrap()).unwrap().evaluate().unwrap();
    assert!(advection.is_grid());
    let expected_advection = expected(&s, 1, |_, x, z| x.sin() * x.cos() * z * z + z * z * 2.0 * z * x.sin());
    assert_approx_complex_eq!(advection.grid_data().unwrap(), expected_advection, abstol = 1e-10);

    let buoyancy = mul(&p, &ez).unwrap().evaluate().unwrap();
    assert_eq!(buoyancy.rank(), 1);
    let expected_buoyancy = expected(&s, 2, |i, x, z| i as f64 * x.sin() * z * z);
    assert_approx_complex_eq!(buoyancy.grid_data().unwrap(), expected_buoyancy, abstol = 1e-12);

    let scaled = mul(Scalar::new("R", -0.5), &u).unwrap().evaluate().unwrap();
    let expected_scaled = expected(&s, 2, |i, x, z| if i == 0 { -0.5 * x.sin() } else { -0.5 * z * z });
    assert_approx_complex_eq!(scaled.grid_data().unwrap(), expected_scaled, abstol = 1e-12);
}

#[test]
fn real_fields_with_nyquist_content_stay_real() {
    let s = setup();
    let p = scalar_field(&s, |x, z| (4.0 * x).cos() * z);
    let grad = gradient(&p, &s.c).unwrap().evaluate().unwrap();
    let expected_grad = expected(&s, 2, |i, x, z| match i {
        0 => -4.0 * (4.0 * x).sin() * z,
        _ => (4.0 * x).cos(),
    });
    assert_approx_complex_eq!(grid_values(grad), expected_grad, abstol = 1e-10);

    let small_x = Basis::complex_fourier(&s.c.coords()[0], 4, (0.0, 2.0 * std::f64::consts::PI)).unwrap();
    let mut coarse = Field::new(&s.dist, &[small_x], Dtype::Float64, TensorSignature::scalar()).unwrap();
    coarse.fill_grid(|_, x| real((2.0 * x[0]).cos())).unwrap();
    let zero = scalar_field(&s, |_, _| 0.0);
    let sum = add(coarse.into_shared(), &zero).unwrap().evaluate().unwrap();
    assert_approx_complex_eq!(grid_values(sum), expected(&s, 1, |_, x, _| (2.0 * x).cos()), abstol = 1e-12);
}

#[test]
fn constants_are_promoted_in_sums() {
    let s = setup();
    let z = &s.c.coords()[1];
    let p = scalar_field(&s, |x, z| x.cos() + z);
    let shifted = sub(&p, 1.5).unwrap().evaluate().unwrap();
    assert_approx_complex_eq!(grid_values(shifted), expected(&s, 1, |_, x, z| x.cos() + z - 1.5), abstol = 1e-12);

    let boundary = add(interpolate(&p, z, 1.0).unwrap(), 2.0).unwrap().evaluate().unwrap();
    assert_eq!(boundary.domain().bases(), vec![&s.xb]);
    let mut expected_boundary = Field::new(&s.dist, &[s.xb.clone()], Dtype::Float64, TensorSignature::scalar()).unwrap();
    expected_boundary.fill_grid(|_, x| real(x[0].cos() + 3.0)).unwrap();
    assert_approx_complex_eq!(
        grid_values(boundary),
        expected_boundary.grid_data().unwrap(),
        abstol = 1e-12
    );
}

#[test]
fn failing_operator_is_named_once() {
    let s = setup();
    let z = &s.c.coords()[1];
    let p = scalar_field(&s, |x, _| x.sin());
    let expr = add(&p, differentiate(&p, z, 0).unwrap()).unwrap();
    let error = expr.evaluate().unwrap_err();
    match &error {
        SpectralError::EvaluationError { operator, source } => {
            assert_eq!(operator, "Differentiate");
            assert!(matches!(**source, SpectralError::UnsupportedOperation(_)));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(matches!(error.root_cause(), SpectralError::UnsupportedOperation(_)));

    assert!(matches!(
        Operand::Number(real(1.0)).evaluate(),
        Err(SpectralError::UnsupportedOperation(_))
    ));
}

#[test]
fn repeated_evaluation_is_bit_identical() {
    let s = setup();
    let p = scalar_field(&s, |x, z| (2.0 * x).sin() * z + z * z * z);
    let u = field(&s, TensorSignature::vector(&s.c), |i, x, z| (i as f64 + 1.0) * x.cos() * z);
    let grad_p = gradient(&p, &s.c).unwrap();
    // Shared sub-expressions
    let expr = add(dot(&u, &grad_p).unwrap(), divergence(add(&grad_p, &grad_p).unwrap(), 0).unwrap()).unwrap();

    let first = expr.evaluate().unwrap();
    let second = expr.evaluate().unwrap();
    assert_eq!(first.coefficient_data().unwrap(), second.coefficient_data().unwrap());

    let parallel = Evaluator::new().with_parallel_threshold(1).evaluate(&expr).unwrap();
    assert_eq!(first.coefficient_data().unwrap(), parallel.coefficient_data().unwrap());

    // The input fields are untouched
    assert!(p.read().is_grid());
    assert!(u.read().is_grid());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]
    #[test]
    fn gradient_is_linear(a in complex_vec(64), b in complex_vec(64)) {
        let s = setup();
        let fa = Field::new(&s.dist, &[s.xb.clone(), s.zb.clone()], Dtype::Complex128, TensorSignature::scalar()).unwrap().into_shared();
        let fb = Field::new(&s.dist, &[s.xb.clone(), s.zb.clone()], Dtype::Complex128, TensorSignature::scalar()).unwrap().into_shared();
        fa.write().grid_data_mut().unwrap().copy_from_slice(&a);
        fb.write().grid_data_mut().unwrap().copy_from_slice(&b);

        let sum_first = gradient(add(&fa, &fb).unwrap(), &s.c).unwrap().evaluate().unwrap();
        let grad_first = add(gradient(&fa, &s.c).unwrap(), gradient(&fb, &s.c).unwrap()).unwrap().evaluate().unwrap();
        assert_approx_complex_eq!(
            sum_first.coefficient_data().unwrap(),
            grad_first.coefficient_data().unwrap(),
            abstol = 1e-8
        );
    }
}
