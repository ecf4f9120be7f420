//! AST-to-CST lowering and build-time validation for the `mlr` DSL.

pub mod ast;
pub mod cst;
mod build;
mod error;

#[cfg(test)]
mod build_tests;

pub use build::build_program;
pub use error::CstError;
