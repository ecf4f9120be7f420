use mlr_core::TypeError;

/// Runtime failures from executing a built CST: type, lookup, I/O, and
/// value errors. `Absent` never appears here — it's a value, not a
/// failure.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("strict boolean guard requires Bool, found {0}")]
    NotBool(&'static str),
    #[error("assignment violates the declared type mask for `{0}`")]
    TypeMaskViolation(String),
    #[error("keypath assignment into a scalar-only local `{0}`")]
    ScalarOnlyLocal(String),
    #[error("call to undefined function `{0}`")]
    UndefinedFunction(String),
    #[error("function `{0}` called with {1} arguments, expected {2}")]
    WrongArity(String, usize, usize),
    #[error("malformed numeric literal `{0}` under strict parsing")]
    ValueError(String),
    #[error("I/O error on output sink `{0}`: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("unknown output redirect target `{0}`")]
    BadRedirectTarget(String),
}

impl From<TypeError> for RuntimeError {
    fn from(e: TypeError) -> Self {
        match e {
            TypeError::NotBool(name) => RuntimeError::NotBool(name),
        }
    }
}
