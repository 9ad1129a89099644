//! Evaluation of operator expressions into fields.
//!
//! The evaluator first makes all domain conversions explicit and then walks the expression tree
//! bottom-up. Products are formed in grid space, all other operators produce coefficient data.
//! Each distinct sub-expression is evaluated at most once per call (and per representation), so
//! expressions that share sub-trees or fields do not repeat transforms or collective exchanges.
use crate::error::SpectralError;
use crate::field::{Field, Representation};
use crate::operators::{apply_conversions, NodeId, Operand, OperatorKind, OperatorNode};
use log::{debug, trace};
use num::complex::Complex64;
use num::Zero;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NodeKey {
    Operator(NodeId),
    Field(usize),
}

/// Evaluates expressions, memoizing intermediate results within each call.
#[derive(Debug)]
pub struct Evaluator {
    memo: FxHashMap<(NodeKey, Representation), Field>,
    parallel_threshold: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            memo: FxHashMap::default(),
            parallel_threshold: 1 << 14,
        }
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer length from which pointwise kernels run in parallel.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Evaluates `operand` into a new field.
    ///
    /// Plain fields are returned as a snapshot in their current representation. Operator results
    /// are in grid representation for products and in coefficient representation otherwise.
    /// Failures inside an operator are reported as [`SpectralError::EvaluationError`] naming the
    /// innermost failing operator.
    ///
    /// This is a collective operation when the distributor spans several ranks.
    pub fn evaluate(&mut self, operand: &Operand) -> Result<Field, SpectralError> {
        self.memo.clear();
        let converted = apply_conversions(operand)?;
        debug!("Evaluating {converted}");
        let result = match &converted {
            Operand::Field(field) => Ok(field.read().clone()),
            Operand::Operator(node) => self.eval(&converted, natural_representation(node.kind())),
            _ => Err(SpectralError::UnsupportedOperation(format!(
                "the constant {converted} is not attached to a distributor; cast it to a field first"
            ))),
        };
        self.memo.clear();
        result
    }

    fn eval(&mut self, operand: &Operand, representation: Representation) -> Result<Field, SpectralError> {
        let key = match operand {
            Operand::Field(field) => NodeKey::Field(Arc::as_ptr(field) as usize),
            Operand::Operator(node) => NodeKey::Operator(node.id()),
            _ => {
                return Err(SpectralError::UnsupportedOperation(format!(
                    "the constant {operand} cannot be evaluated on its own"
                )))
            }
        };
        if let Some(field) = self.memo.get(&(key, representation)) {
            return Ok(field.clone());
        }

        let mut field = match operand {
            Operand::Operator(node) => {
                trace!("Evaluating {} node {:?}", node.kind().name(), node.id());
                self.eval_node(node)
                    .map_err(|err| err.during_evaluation_of(node.kind().name()))?
            }
            Operand::Field(field) => field.read().clone(),
            _ => unreachable!(),
        };
        field.require_representation(representation);
        self.memo.insert((key, representation), field.clone());
        Ok(field)
    }

    fn eval_node(&mut self, node: &OperatorNode) -> Result<Field, SpectralError> {
        use Representation::{Coefficient, Grid};
        let args = node.args();
        match node.kind() {
            OperatorKind::Add => {
                let a = self.eval(&args[0], Coefficient)?;
                let b = self.eval(&args[1], Coefficient)?;
                check_same_domain(&a, &b)?;
                let data = self.zip_map(a.data(), b.data(), |x, y| x + y);
                Ok(a.with_data(node.tensorsig().clone(), node.dtype(), data))
            }
            OperatorKind::Negate => {
                let a = self.eval(&args[0], Coefficient)?;
                let data = self.map(a.data(), |x| -x);
                Ok(a.with_data(node.tensorsig().clone(), node.dtype(), data))
            }
            OperatorKind::Multiply => match (args[0].constant_value(), args[1].constant_value()) {
                (Some(factor), _) => self.scale(node, &args[1], factor),
                (_, Some(factor)) => self.scale(node, &args[0], factor),
                _ => {
                    let a = self.eval(&args[0], Grid)?;
                    let b = self.eval(&args[1], Grid)?;
                    check_same_domain(&a, &b)?;
                    let data = outer_product(a.data(), a.tensorsig().num_components(), b.data(), b.tensorsig().num_components());
                    Ok(a.with_data(node.tensorsig().clone(), node.dtype(), data))
                }
            },
            OperatorKind::DotProduct => {
                let a = self.eval(&args[0], Grid)?;
                let b = self.eval(&args[1], Grid)?;
                check_same_domain(&a, &b)?;
                let data = contract(&a, &b);
                Ok(a.with_data(node.tensorsig().clone(), node.dtype(), data))
            }
            OperatorKind::Differentiate { coord, order } => self.eval(&args[0], Coefficient)?.differentiate(coord, *order),
            OperatorKind::Gradient { coords } => {
                let f = self.eval(&args[0], Coefficient)?;
                let mut data = Vec::with_capacity(f.data().len() * coords.axis_count());
                for coord in coords.coords() {
                    data.extend_from_slice(f.differentiate(coord, 1)?.data());
                }
                Ok(f.with_data(node.tensorsig().clone(), node.dtype(), data))
            }
            OperatorKind::Laplacian { coords } => {
                let f = self.eval(&args[0], Coefficient)?;
                let mut data = vec![Complex64::zero(); f.data().len()];
                for coord in coords.coords() {
                    let d2 = f.differentiate(coord, 2)?;
                    data = self.zip_map(&data, d2.data(), |x, y| x + y);
                }
                Ok(f.with_data(node.tensorsig().clone(), node.dtype(), data))
            }
            OperatorKind::Divergence { index } => {
                let f = self.eval(&args[0], Coefficient)?;
                let tensorsig = f.tensorsig().clone();
                let reduced = tensorsig.without(*index);
                let block = block_len(&f);
                let mut data = vec![Complex64::zero(); reduced.num_components() * block];
                for (value, coord) in tensorsig.slots()[*index].coords().iter().enumerate() {
                    let slice: Vec<Complex64> = tensorsig
                        .components_with(*index, value)
                        .into_iter()
                        .flat_map(|component| f.data()[component * block..(component + 1) * block].iter().copied())
                        .collect();
                    let derivative = f
                        .with_data(reduced.clone(), f.dtype(), slice)
                        .differentiate(coord, 1)?;
                    data = self.zip_map(&data, derivative.data(), |x, y| x + y);
                }
                Ok(f.with_data(reduced, node.dtype(), data))
            }
            OperatorKind::Interpolate { coord, position } => self.eval(&args[0], Coefficient)?.evaluate_at(coord, *position),
            OperatorKind::Convert { target } => match args[0].constant_value() {
                Some(value) => {
                    let dist = node.distributor().ok_or_else(|| {
                        SpectralError::UnsupportedOperation(format!("the constant {value} has no distributor"))
                    })?;
                    Field::constant(dist, value).convert_to(target)
                }
                None => self.eval(&args[0], Coefficient)?.convert_to(target),
            },
        }
    }

    fn scale(&mut self, node: &OperatorNode, operand: &Operand, factor: Complex64) -> Result<Field, SpectralError> {
        let f = self.eval(operand, Representation::Coefficient)?;
        let data = self.map(f.data(), |x| x * factor);
        Ok(f.with_data(node.tensorsig().clone(), node.dtype(), data))
    }

    fn map(&self, a: &[Complex64], f: impl Fn(Complex64) -> Complex64 + Sync + Send) -> Vec<Complex64> {
        if a.len() >= self.parallel_threshold {
            a.par_iter().map(|&x| f(x)).collect()
        } else {
            a.iter().map(|&x| f(x)).collect()
        }
    }

    fn zip_map(
        &self,
        a: &[Complex64],
        b: &[Complex64],
        f: impl Fn(Complex64, Complex64) -> Complex64 + Sync + Send,
    ) -> Vec<Complex64> {
        assert_eq!(a.len(), b.len(), "Internal error: operand buffers differ in length");
        if a.len() >= self.parallel_threshold {
            a.par_iter().zip(b.par_iter()).map(|(&x, &y)| f(x, y)).collect()
        } else {
            a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
        }
    }
}

fn natural_representation(kind: &OperatorKind) -> Representation {
    match kind {
        OperatorKind::Multiply | OperatorKind::DotProduct => Representation::Grid,
        _ => Representation::Coefficient,
    }
}

fn check_same_domain(a: &Field, b: &Field) -> Result<(), SpectralError> {
    if a.domain() == b.domain() {
        Ok(())
    } else {
        Err(SpectralError::IncompatibleBasis(format!(
            "operands on {} and {} were not converted to a common domain",
            a.domain(),
            b.domain()
        )))
    }
}

/// Length of the local data of a single tensor component.
fn block_len(field: &Field) -> usize {
    field.local_shape()[1..].iter().product()
}

fn outer_product(a: &[Complex64], a_components: usize, b: &[Complex64], b_components: usize) -> Vec<Complex64> {
    let block = a.len() / a_components.max(1);
    let mut output = Vec::with_capacity(a_components * b_components * block);
    for i in 0..a_components {
        let a_block = &a[i * block..(i + 1) * block];
        for j in 0..b_components {
            let b_block = &b[j * block..(j + 1) * block];
            output.extend(a_block.iter().zip(b_block).map(|(x, y)| x * y));
        }
    }
    output
}

/// Pointwise contraction of the last slot of `a` with the first slot of `b`.
fn contract(a: &Field, b: &Field) -> Vec<Complex64> {
    let n = a
        .tensorsig()
        .slots()
        .last()
        .map(|cs| cs.axis_count())
        .unwrap_or(1);
    let a_outer = a.tensorsig().num_components() / n;
    let b_inner = b.tensorsig().num_components() / n;
    let block = block_len(a);
    let mut output = vec![Complex64::zero(); a_outer * b_inner * block];
    for i in 0..a_outer {
        for j in 0..b_inner {
            let out = &mut output[(i * b_inner + j) * block..(i * b_inner + j + 1) * block];
            for k in 0..n {
                let a_block = &a.data()[(i * n + k) * block..(i * n + k + 1) * block];
                let b_block = &b.data()[(k * b_inner + j) * block..(k * b_inner + j + 1) * block];
                for ((o, x), y) in out.iter_mut().zip(a_block).zip(b_block) {
                    *o += x * y;
                }
            }
        }
    }
    output
}
