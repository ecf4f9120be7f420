use mlr_core::Diagnostics;

/// Build-time failures from lowering an [`crate::ast::AstProgram`] into a
/// [`crate::cst::Program`].
#[derive(Debug, thiserror::Error)]
pub enum CstError {
    #[error("program failed build-time validation")]
    Invalid(Diagnostics),
    #[error("call to undefined function `{0}`")]
    UndefinedFunction(String),
    #[error("call to undefined subroutine `{0}`")]
    UndefinedSubroutine(String),
    #[error("duplicate definition of `{0}`")]
    DuplicateDefinition(String),
}
