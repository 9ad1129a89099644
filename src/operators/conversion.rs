//! Insertion of explicit conversions into expression trees.
//!
//! Operators that combine several arguments work on a single common domain. Before evaluation,
//! every argument whose domain differs from that of its parent is wrapped in a `Convert` node.
use super::{Operand, OperatorKind, OperatorNode};
use crate::distributor::Distributor;
use crate::error::SpectralError;
use crate::field::Domain;
use log::debug;
use std::sync::Arc;

fn needs_conversion(kind: &OperatorKind, arg: &Operand, domain: &Domain) -> bool {
    if arg.is_constant_value() {
        // Constants only scale products, but sums need them spread over the common domain
        *kind == OperatorKind::Add
    } else {
        arg.domain() != *domain
    }
}

fn wrap(operand: Operand, target: &Domain, dist: Option<Arc<Distributor>>) -> Result<Operand, SpectralError> {
    let kind = OperatorKind::Convert { target: target.clone() };
    Ok(Operand::Operator(Arc::new(OperatorNode::new(kind, vec![operand], dist)?)))
}

/// Returns the expression with all implicit domain promotions made explicit.
///
/// Sub-trees that need no conversion are shared with the input, so applying this to its own
/// output returns the very same operand.
pub fn apply_conversions(operand: &Operand) -> Result<Operand, SpectralError> {
    let node = match operand {
        Operand::Operator(node) => node,
        _ => return Ok(operand.clone()),
    };

    let mut changed = false;
    let mut args = Vec::with_capacity(node.args().len());
    for arg in node.args() {
        let converted = apply_conversions(arg)?;
        changed |= !converted.ptr_eq(arg);
        args.push(converted);
    }

    if node.kind().merges_domains() {
        for arg in &mut args {
            if needs_conversion(node.kind(), arg, node.domain()) {
                debug!("Converting {} onto {}", arg, node.domain());
                *arg = wrap(arg.clone(), node.domain(), node.distributor().cloned())?;
                changed = true;
            }
        }
    }

    if changed {
        let rebuilt = OperatorNode::new(node.kind().clone(), args, node.distributor().cloned())?;
        debug_assert_eq!(rebuilt.domain(), node.domain());
        Ok(Operand::Operator(Arc::new(rebuilt)))
    } else {
        Ok(operand.clone())
    }
}

/// Converts `operand` onto `target`.
///
/// Conversions are first applied within the expression. If its domain then already equals
/// `target`, no further node is added.
pub fn convert(operand: impl Into<Operand>, target: &Domain) -> Result<Operand, SpectralError> {
    let converted = apply_conversions(&operand.into())?;
    if converted.domain() == *target {
        Ok(converted)
    } else if converted.is_constant_value() {
        Err(SpectralError::UnsupportedOperation(format!(
            "cannot convert the constant {converted} without a distributor; cast it to a field first"
        )))
    } else {
        let dist = converted.distributor();
        wrap(converted, target, dist)
    }
}
