//! Top-level CLI failures: a lex/parse failure in the DSL front end, a
//! CST build-time validation failure, or a failure from the pipeline
//! itself. `main` renders these and exits non-zero.

use crate::dsl::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Cst(#[from] mlr_cst::CstError),
    #[error(transparent)]
    Pipeline(#[from] mlr_runtime::PipelineError),
    #[error(transparent)]
    Step(#[from] mlr_step::StepError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
