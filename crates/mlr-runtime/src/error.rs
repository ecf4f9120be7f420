//! Pipeline-level failures: a runtime error from the DSL, a configuration
//! error from the step transformer, or an output I/O error surfacing from
//! either.

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Runtime(#[from] mlr_eval::RuntimeError),
    #[error(transparent)]
    Step(#[from] mlr_step::StepError),
}
