//! The DSL front end: turns program text into an [`mlr_cst::ast::AstProgram`]
//! for [`mlr_cst::build_program`] to validate and lower.

pub mod lexer;
pub mod parser;

pub use parser::{parse_program, ParseError};
