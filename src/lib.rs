//! Operator algebra, basis conversion and evaluation for spectral discretizations of PDEs.
//!
//! Fields are tensor-valued arrays over a tuple of spectral [bases](basis::Basis), distributed
//! over the ranks of a [process group](spectris_comm::Communicator). Equations are written as
//! lazy [operator expressions](operators) of fields, which are brought onto common bases by the
//! conversion pass and then [evaluated](evaluate::Evaluator) into new fields.
pub mod basis;
pub mod coords;
pub mod distributor;
pub mod error;
pub mod evaluate;
pub mod field;
pub mod operators;
pub mod problem;
pub mod tensor;
pub mod util;

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate spectris_comm;
