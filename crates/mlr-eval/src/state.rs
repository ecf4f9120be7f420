//! The run-state threaded through expression evaluation and statement
//! execution: the current record, the process-lifetime oosvar store, the
//! active local-variable frame stack, the per-record dynamic context, and
//! (for statement execution only) the output router, emit queue, and
//! filter flag.

use indexmap::IndexMap;

use mlr_core::{Colors, InferencePolicy, MultiLevelMap, Record, RecordFields};
use mlr_cst::cst::Function;

use crate::context::RecordContext;
use crate::local_stack::LocalStack;
use crate::output::OutputRouter;

/// Everything an expression or statement needs to resolve names and run
/// user-defined functions/subroutines.
pub struct ExecState<'a> {
    pub record: RecordFields,
    pub oosvars: MultiLevelMap,
    pub locals: LocalStack,
    pub policy: InferencePolicy,
    pub rctx: RecordContext,
    pub ofmt: Option<&'a str>,
    /// Palette used by `dump` to colorize its stacked-map rendering.
    pub colors: Colors,
    pub functions: &'a IndexMap<String, Function>,
    pub subroutines: &'a IndexMap<String, Function>,
    pub output: &'a mut OutputRouter,
    /// Records produced by `emit`/`emitf` during this record's processing,
    /// in production order.
    pub emitted: Vec<Record>,
    /// The "emit current record?" flag set by `filter`; a `put` program
    /// that never executes `filter` leaves this `true`.
    pub filter_result: bool,
}

impl<'a> ExecState<'a> {
    pub fn new(
        record: RecordFields,
        oosvars: MultiLevelMap,
        rctx: RecordContext,
        policy: InferencePolicy,
        ofmt: Option<&'a str>,
        colors: Colors,
        functions: &'a IndexMap<String, Function>,
        subroutines: &'a IndexMap<String, Function>,
        output: &'a mut OutputRouter,
    ) -> Self {
        Self {
            record,
            oosvars,
            locals: LocalStack::new(),
            policy,
            rctx,
            ofmt,
            colors,
            functions,
            subroutines,
            output,
            emitted: Vec::new(),
            filter_result: true,
        }
    }
}
