//! The DSL verbs (`put`, `filter`) as a [`Transformer`]: owns the built
//! [`Program`], the process-lifetime oosvar store, and the output router
//! across records, and runs `begin`/`end` blocks exactly once each.

use mlr_core::{Colors, InferencePolicy, MultiLevelMap, Record, RecordFields};
use mlr_cst::cst::Program;
use mlr_eval::{run_frame_block, Context, ExecState, OutputRouter, RecordContext};

use crate::error::PipelineError;
use crate::transformer::Transformer;

/// Configuration for a `put`/`filter` verb invocation.
pub struct DslConfig {
    pub policy: InferencePolicy,
    pub ofmt: Option<String>,
    /// `-x` on the `filter` verb: invert the final boolean. Meaningless
    /// for `put`.
    pub negate_filter: bool,
    pub filename: String,
    /// Palette for `dump`'s stacked-map rendering; `Colors::OFF` unless the
    /// verb was invoked with `--color`.
    pub colors: Colors,
}

impl DslConfig {
    pub fn from_context(ctx: &Context, policy: InferencePolicy) -> Self {
        Self {
            policy,
            ofmt: ctx.ofmt.clone(),
            negate_filter: false,
            filename: "(stdin)".to_string(),
            colors: Colors::OFF,
        }
    }
}

pub struct DslTransformer {
    program: Program,
    config: DslConfig,
    oosvars: MultiLevelMap,
    output: OutputRouter,
    nr: i64,
}

impl DslTransformer {
    pub fn new(program: Program, config: DslConfig) -> Self {
        Self { program, config, oosvars: MultiLevelMap::new(), output: OutputRouter::new(false), nr: 0 }
    }

    fn run_top_blocks(&mut self, end: bool) -> Result<Vec<Record>, PipelineError> {
        let blocks = if end { &self.program.end_blocks } else { &self.program.begin_blocks };
        let mut out = Vec::new();
        for tb in blocks {
            let oosvars = std::mem::take(&mut self.oosvars);
            let mut st = ExecState::new(
                RecordFields::new(),
                oosvars,
                RecordContext::default(),
                self.config.policy,
                self.config.ofmt.as_deref(),
                self.config.colors,
                &self.program.functions,
                &self.program.subroutines,
                &mut self.output,
            );
            run_frame_block(&tb.frame, &tb.block, &mut st)?;
            out.extend(st.emitted);
            self.oosvars = st.oosvars;
        }
        Ok(out)
    }
}

impl Transformer for DslTransformer {
    fn begin(&mut self) -> Result<Vec<Record>, PipelineError> {
        self.run_top_blocks(false)
    }

    fn process(&mut self, record: Record) -> Result<Vec<Record>, PipelineError> {
        self.nr += 1;
        let nf = record.len() as i64;
        let rctx = RecordContext {
            nr: self.nr,
            nf,
            fnr: self.nr,
            filename: self.config.filename.clone(),
            filenum: 1,
        };

        let oosvars = std::mem::take(&mut self.oosvars);
        let mut st = ExecState::new(
            RecordFields::from_record(record),
            oosvars,
            rctx,
            self.config.policy,
            self.config.ofmt.as_deref(),
            self.config.colors,
            &self.program.functions,
            &self.program.subroutines,
            &mut self.output,
        );
        run_frame_block(&self.program.main_frame, &self.program.main_block, &mut st)?;
        st.record.flush(self.config.ofmt.as_deref());

        let mut out = st.emitted;
        let passes = if self.program.is_filter {
            st.filter_result ^ self.config.negate_filter
        } else {
            st.filter_result
        };
        if passes {
            out.push(st.record.record);
        }
        self.oosvars = st.oosvars;
        Ok(out)
    }

    fn end(&mut self) -> Result<Vec<Record>, PipelineError> {
        self.run_top_blocks(true)
    }
}
