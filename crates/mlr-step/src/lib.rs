//! The step transformer: a small registry of per-field, per-group
//! stateful accumulators driven across a record stream.

mod error;
mod stepper;
mod transformer;

pub use error::StepError;
pub use stepper::{make_stepper, Stepper};
pub use transformer::{StepConfig, StepTransformer};
