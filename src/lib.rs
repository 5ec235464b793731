//! Code generation of local element tensors for finite element weak forms.
//!
//! The integrals of a form are compiled into the bodies of C++ `tabulate_tensor` procedures.
//! Integrands given as factorized terms use the tensor representation, where each entry of
//! the element tensor is a contraction of a precomputed reference tensor with a geometry
//! tensor. Integrands given as expressions are evaluated in a quadrature loop.
pub mod code;
pub mod compiler;
pub mod dependency;
pub mod element;
pub mod error;
pub mod expr;
pub mod format;
pub mod geometry;
pub mod parameters;
pub mod quadrature;
pub mod remove_unused;
pub mod representation;
pub mod table;
pub mod tensor;

pub use compiler::{compile_form, compile_integral, FormIr, IntegralId, IntegralIr, TabulateTensorCode};
pub use error::FormCompilerError;
pub use parameters::FormCompilerParameters;

pub extern crate fenris_crs;
pub extern crate nalgebra;
