//! The `put`/`filter` DSL verbs.

use log::debug;
use mlr_core::{Colors, InferencePolicy, Record};
use mlr_cst::build_program;
use mlr_eval::Context;
use mlr_runtime::{DslConfig, DslTransformer, TransformerRuntime};

use crate::dsl::parse_program;
use crate::error::CliError;

pub fn run(
    ctx: &Context,
    program_text: &str,
    policy: InferencePolicy,
    is_filter: bool,
    negate_filter: bool,
    color: bool,
    records: Vec<Record>,
) -> Result<Vec<Record>, CliError> {
    let ast = parse_program(program_text)?;
    let (program, diagnostics) = match build_program(ast, is_filter) {
        Ok(built) => built,
        Err(mlr_cst::CstError::Invalid(diagnostics)) => {
            eprint!("{}", diagnostics.render("<program>", program_text));
            return Err(mlr_cst::CstError::Invalid(diagnostics).into());
        }
        Err(e) => return Err(e.into()),
    };
    if !diagnostics.is_empty() {
        eprint!("{}", diagnostics.render("<program>", program_text));
    }
    debug!("built {} program ({} begin, {} end blocks)", if is_filter { "filter" } else { "put" }, program.begin_blocks.len(), program.end_blocks.len());

    let mut config = DslConfig::from_context(ctx, policy);
    config.negate_filter = negate_filter;
    config.colors = Colors::new(color);
    let transformer = DslTransformer::new(program, config);
    let mut runtime = TransformerRuntime::new(transformer);
    Ok(runtime.run(records)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(&str, &str)]) -> Record {
        let mut r = Record::new();
        for (k, v) in pairs {
            r.put(*k, *v);
        }
        r
    }

    /// spec.md §8 end-to-end scenario 5: `@s[$g] += $v; end { emit @s, "g" }`
    /// accumulates per-group sums into an oosvar and flattens it on
    /// end-of-stream, keyed by group in MLM insertion order.
    #[test]
    fn oosvar_accumulation_with_end_emit() {
        let ctx = Context::default();
        let records = vec![
            rec(&[("g", "a"), ("v", "1")]),
            rec(&[("g", "b"), ("v", "2")]),
            rec(&[("g", "a"), ("v", "3")]),
        ];
        let out = run(
            &ctx,
            "@s[$g] += $v; end { emit @s, \"g\" }",
            InferencePolicy::StringsFloatsAndInts,
            false,
            false,
            false,
            records,
        )
        .unwrap();
        // 3 pass-through records (this is `put`, not `filter`) followed by
        // the 2 records the end-block's `emit @s, "g"` produces.
        assert_eq!(out.len(), 5);
        let emitted = &out[3..];
        assert_eq!(emitted[0].get("g"), Some("a"));
        assert_eq!(emitted[0].get("s"), Some("4"));
        assert_eq!(emitted[1].get("g"), Some("b"));
        assert_eq!(emitted[1].get("s"), Some("2"));
    }
}
