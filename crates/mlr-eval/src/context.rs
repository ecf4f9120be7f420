//! Immutable, threaded-in execution context. Process-level configuration
//! is not global state; it is built once by the top-level driver and
//! threaded as an immutable object into every transformer.

/// Process-level configuration, read once at startup and threaded into
/// every transformer.
#[derive(Debug, Clone)]
pub struct Context {
    pub program_name: String,
    /// `OFMT`: numeric output format, e.g. `"%.6f"`.
    pub ofmt: Option<String>,
    pub key_column_default: String,
    pub value_column_default: String,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            program_name: "mlr".to_string(),
            ofmt: None,
            key_column_default: "key".to_string(),
            value_column_default: "value".to_string(),
        }
    }
}

impl Context {
    /// Build a [`Context`] from the process environment (`OFMT`,
    /// `MLR_KEY_COLUMN_DEFAULT`, `MLR_VALUE_COLUMN_DEFAULT`).
    pub fn from_env(program_name: impl Into<String>) -> Self {
        let mut ctx = Self { program_name: program_name.into(), ..Self::default() };
        if let Ok(v) = std::env::var("OFMT") {
            ctx.ofmt = Some(v);
        }
        if let Ok(v) = std::env::var("MLR_KEY_COLUMN_DEFAULT") {
            ctx.key_column_default = v;
        }
        if let Ok(v) = std::env::var("MLR_VALUE_COLUMN_DEFAULT") {
            ctx.value_column_default = v;
        }
        ctx
    }
}

/// Per-record dynamic context variables (`NR`, `NF`, `FNR`, `FILENAME`, …).
#[derive(Debug, Clone)]
pub struct RecordContext {
    pub nr: i64,
    pub nf: i64,
    pub fnr: i64,
    pub filename: String,
    pub filenum: i64,
}

impl Default for RecordContext {
    fn default() -> Self {
        Self { nr: 0, nf: 0, fnr: 0, filename: "(stdin)".to_string(), filenum: 1 }
    }
}
