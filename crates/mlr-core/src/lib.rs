#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Foundational data model for `mlr`: the tagged scalar [`Value`], the
//! [`Record`]/[`TypedOverlay`] pair, the recursive [`MultiLevelMap`], and
//! the shared diagnostics machinery the rest of the workspace builds on.

mod colors;
mod diagnostics;
mod mlm;
mod record;
mod value;

pub use colors::Colors;
pub use diagnostics::{Diagnostic, Diagnostics, Severity, Span};
pub use mlm::{LevelEntry, MultiLevelMap};
pub use record::{FieldRead, Record, RecordFields, TypedOverlay};
pub use value::{InferencePolicy, TypeError, TypeMask, Value};
