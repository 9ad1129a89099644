use num::complex::Complex64;
use spectris::basis::Basis;
use spectris::coords::CoordinateSystem;
use spectris::distributor::Distributor;
use spectris::error::SpectralError;
use spectris::field::{Domain, Dtype, Field, SharedField};
use spectris::operators::{
    add, apply_conversions, convert, differentiate, divergence, dot, gradient, interpolate, laplacian, mul, neg, sub,
    Operand, OperatorKind, Scalar,
};
use spectris::tensor::TensorSignature;
use std::sync::Arc;

struct Setup {
    c: CoordinateSystem,
    dist: Arc<Distributor>,
    xb: Basis,
    yb: Basis,
    zb: Basis,
}

fn setup() -> Setup {
    let c = CoordinateSystem::cartesian(&["x", "y", "z"]).unwrap();
    let dist = Arc::new(Distributor::new(vec![c.clone()]).unwrap());
    let coords = c.coords();
    Setup {
        xb: Basis::complex_fourier(&coords[0], 8, (0.0, 4.0)).unwrap(),
        yb: Basis::complex_fourier(&coords[1], 8, (0.0, 4.0)).unwrap(),
        zb: Basis::chebyshev_t(&coords[2], 8, (0.0, 1.0)).unwrap(),
        c,
        dist,
    }
}

fn field(s: &Setup, name: &str, bases: &[Basis], tensorsig: TensorSignature) -> SharedField {
    Field::builder(&s.dist)
        .with_name(name)
        .with_bases(bases)
        .with_dtype(Dtype::Complex128)
        .with_tensorsig(tensorsig)
        .build()
        .unwrap()
        .into_shared()
}

fn all_bases(s: &Setup) -> Vec<Basis> {
    vec![s.xb.clone(), s.yb.clone(), s.zb.clone()]
}

/// Checks that every combining node has arguments on its own domain.
fn assert_converted(operand: &Operand) {
    if let Operand::Operator(node) = operand {
        if node.kind().merges_domains() {
            for arg in node.args() {
                if !(arg.is_constant_value() && *node.kind() != OperatorKind::Add) {
                    assert_eq!(&arg.domain(), node.domain(), "unconverted argument {arg} of {operand}");
                }
            }
        }
        node.args().iter().for_each(assert_converted);
    }
}

#[test]
fn rank_algebra() {
    let s = setup();
    let p = field(&s, "p", &all_bases(&s), TensorSignature::scalar());
    let u = field(&s, "u", &all_bases(&s), TensorSignature::vector(&s.c));

    assert_eq!(divergence(&u, 0).unwrap().tensorsig().rank(), 0);
    assert_eq!(gradient(&p, &s.c).unwrap().tensorsig().rank(), 1);
    assert_eq!(dot(&u, gradient(&p, &s.c).unwrap()).unwrap().tensorsig().rank(), 0);
    assert_eq!(gradient(&u, &s.c).unwrap().tensorsig().rank(), 2);
    assert_eq!(dot(&u, gradient(&u, &s.c).unwrap()).unwrap().tensorsig(), TensorSignature::vector(&s.c));
    assert_eq!(mul(&p, &u).unwrap().tensorsig().rank(), 1);
    assert_eq!(mul(&u, &u).unwrap().tensorsig().rank(), 2);
    assert_eq!(laplacian(&u, &s.c).unwrap().tensorsig().rank(), 1);
    assert_eq!(mul(Scalar::new("R", 2.0), &u).unwrap().tensorsig().rank(), 1);
}

#[test]
fn malformed_tensor_expressions_are_rejected() {
    let s = setup();
    let p = field(&s, "p", &all_bases(&s), TensorSignature::scalar());
    let u = field(&s, "u", &all_bases(&s), TensorSignature::vector(&s.c));

    assert!(matches!(add(&p, &u), Err(SpectralError::TensorMismatch(_))));
    assert!(matches!(add(1.0, &u), Err(SpectralError::TensorMismatch(_))));
    assert!(matches!(divergence(&p, 0), Err(SpectralError::TensorMismatch(_))));
    assert!(matches!(divergence(&u, 1), Err(SpectralError::TensorMismatch(_))));
    assert!(matches!(dot(&p, &u), Err(SpectralError::TensorMismatch(_))));
    assert!(matches!(dot(&u, 2.0), Err(SpectralError::UnsupportedOperation(_))));
}

#[test]
fn dot_product_of_incompatible_kinds_fails_at_construction() {
    let s = setup();
    let z = &s.c.coords()[2];
    let fourier_z = Basis::complex_fourier(z, 8, (0.0, 1.0)).unwrap();
    let u = field(&s, "u", &all_bases(&s), TensorSignature::vector(&s.c));
    let v = field(
        &s,
        "v",
        &[s.xb.clone(), s.yb.clone(), fourier_z],
        TensorSignature::vector(&s.c),
    );
    assert!(matches!(dot(&u, &v), Err(SpectralError::IncompatibleBasis(_))));
    assert!(matches!(add(&u, &v), Err(SpectralError::IncompatibleBasis(_))));
}

#[test]
fn operands_from_different_distributors_do_not_mix() {
    let s = setup();
    let t = setup();
    let p = field(&s, "p", &all_bases(&s), TensorSignature::scalar());
    let q = field(&t, "q", &all_bases(&t), TensorSignature::scalar());
    assert!(matches!(add(&p, &q), Err(SpectralError::IncompatibleBasis(_))));
}

#[test]
fn boundary_evaluation_shrinks_the_domain() {
    let s = setup();
    let x = &s.c.coords()[0];
    let z = &s.c.coords()[2];
    let u = field(&s, "u", &all_bases(&s), TensorSignature::vector(&s.c));
    let uz = Operand::from(&u).at(z, 0.0).unwrap();
    assert_eq!(uz.domain().bases(), vec![&s.xb, &s.yb]);
    assert_eq!(uz.tensorsig(), TensorSignature::vector(&s.c));

    // Nothing left to evaluate along z
    assert!(matches!(interpolate(&uz, z, 1.0), Err(SpectralError::BasisNotPresent(_))));
    let b = field(&s, "b", &[s.yb.clone()], TensorSignature::scalar());
    assert!(matches!(interpolate(&b, x, 0.0), Err(SpectralError::BasisNotPresent(_))));
    assert!(matches!(interpolate(&u, z, 2.0), Err(SpectralError::UnsupportedOperation(_))));
}

#[test]
fn constants_fold_and_cannot_be_differentiated() {
    let s = setup();
    let z = &s.c.coords()[2];
    let folded = add(1.0, mul(2.0, Scalar::new("R", 3.0)).unwrap()).unwrap();
    assert!(matches!(folded, Operand::Number(value) if value == Complex64::new(7.0, 0.0)));
    assert!(matches!(neg(2.0).unwrap(), Operand::Number(value) if value == Complex64::new(-2.0, 0.0)));
    assert!(matches!(
        differentiate(1.0, z, 1),
        Err(SpectralError::UnsupportedOperation(_))
    ));
    assert!(matches!(
        convert(2.0, &Domain::constant(3)),
        Err(SpectralError::UnsupportedOperation(_))
    ));

    let cast = Operand::cast(Scalar::new("Lz", 1.0), &s.dist);
    match cast {
        Operand::Field(field) => {
            let field = field.read();
            assert_eq!(field.name(), Some("Lz"));
            assert_eq!(field.grid_data().unwrap(), &[Complex64::new(1.0, 0.0)]);
        }
        other => panic!("expected a field, got {other:?}"),
    }
}

#[test]
fn expressions_display_their_structure() {
    let s = setup();
    let z = &s.c.coords()[2];
    let b = field(&s, "b", &all_bases(&s), TensorSignature::scalar());
    let u = field(&s, "u", &all_bases(&s), TensorSignature::vector(&s.c));

    let expr = sub(mul(Scalar::new("P", 0.5), laplacian(&b, &s.c).unwrap()).unwrap(), &b).unwrap();
    assert_eq!(expr.to_string(), "(P*lap(b) + -b)");
    assert_eq!(dot(&u, gradient(&b, &s.c).unwrap()).unwrap().to_string(), "dot(u, grad(b))");
    assert_eq!(differentiate(&b, z, 2).unwrap().to_string(), "dz^2(b)");
    assert_eq!(interpolate(&b, z, 0.0).unwrap().to_string(), "b(z=0)");
}

#[test]
fn conversion_is_idempotent() {
    let s = setup();
    let x = &s.c.coords()[0];
    let z = &s.c.coords()[2];
    let small_x = Basis::complex_fourier(x, 4, (0.0, 4.0)).unwrap();
    let p = field(&s, "p", &all_bases(&s), TensorSignature::scalar());
    let q = field(&s, "q", &[small_x, s.zb.clone()], TensorSignature::scalar());
    let r = field(&s, "r", &[s.zb.clone()], TensorSignature::scalar());

    let expr = add(sub(mul(&q, &r).unwrap(), 1.0).unwrap(), dot(gradient(&p, &s.c).unwrap(), gradient(&q, &s.c).unwrap()).unwrap()).unwrap();
    let expr = add(expr, differentiate(&p, z, 1).unwrap()).unwrap();
    assert_eq!(expr.domain().bases(), vec![&s.xb, &s.yb, &s.zb]);

    let converted = apply_conversions(&expr).unwrap();
    assert!(!converted.ptr_eq(&expr));
    assert_converted(&converted);

    let again = apply_conversions(&converted).unwrap();
    assert!(again.ptr_eq(&converted));
    assert_eq!(again.to_string(), converted.to_string());

    // Converting onto the domain an operand already lives on adds nothing
    let same = convert(&p, &Operand::from(&p).domain()).unwrap();
    assert!(same.ptr_eq(&Operand::from(&p)));
    let promoted = convert(&r, &expr.domain()).unwrap();
    assert!(matches!(&promoted, Operand::Operator(node) if matches!(node.kind(), OperatorKind::Convert { .. })));
    assert!(convert(&promoted, &expr.domain()).unwrap().ptr_eq(&promoted));
}
