//! The `step` verb's CLI surface.

use log::debug;
use mlr_core::Record;
use mlr_eval::Context;
use mlr_runtime::TransformerRuntime;
use mlr_step::{StepConfig, StepTransformer};

use crate::error::CliError;

#[allow(clippy::too_many_arguments)]
pub fn run(
    ctx: &Context,
    steppers: Vec<String>,
    fields: Vec<String>,
    group_by: Vec<String>,
    alphas: Vec<String>,
    float: bool,
    records: Vec<Record>,
) -> Result<Vec<Record>, CliError> {
    let config = StepConfig {
        stepper_names: steppers,
        value_field_names: fields,
        group_by_field_names: group_by,
        allow_int_float: !float,
        string_alphas: alphas,
        ofmt: ctx.ofmt.clone(),
    };
    debug!("step: {} stepper(s), {} value field(s)", config.stepper_names.len(), config.value_field_names.len());
    let transformer = StepTransformer::new(config)?;
    let mut runtime = TransformerRuntime::new(transformer);
    Ok(runtime.run(records)?)
}
