//! Expression evaluation and statement execution over a built [`mlr_cst`]
//! program: the per-record [`ExecState`], the tree-walking evaluator, and
//! the builtin function library.

mod context;
mod error;
mod eval;
mod exec;
mod functions;
mod local_stack;
mod output;
mod state;

pub use context::{Context, RecordContext};
pub use error::RuntimeError;
pub use eval::{eval_expr, eval_scalar, record_to_map, EvalValue};
pub use exec::{call_function, call_subroutine, exec_block, run_frame_block, Flow};
pub use local_stack::LocalStack;
pub use output::OutputRouter;
pub use state::ExecState;
