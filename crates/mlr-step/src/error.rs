//! Failures from configuring or running the step transformer.

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("stepper \"{0}\" not found")]
    UnknownStepper(String),
    #[error("malformed decay alpha \"{0}\"")]
    BadAlpha(String),
}
