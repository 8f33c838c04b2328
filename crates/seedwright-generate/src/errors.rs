use thiserror::Error;

/// Model output that could not be turned into records.
///
/// Both variants carry a bounded preview of the text that was examined so a
/// failed table can be diagnosed and retried on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    #[error("no structured payload found in model output: {preview}")]
    NoPayload { preview: String },
    #[error("model output payload could not be decoded ({message}): {preview}")]
    Decode { message: String, preview: String },
}

impl RecoveryError {
    pub fn preview(&self) -> &str {
        match self {
            RecoveryError::NoPayload { preview } | RecoveryError::Decode { preview, .. } => preview,
        }
    }
}

/// Errors emitted by the generation pipeline.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    #[error("model error: {0}")]
    Model(String),
    #[error("constraint check failed: {0}")]
    Checks(String),
    #[error("store error: {0}")]
    Store(String),
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    #[error(transparent)]
    Schema(#[from] seedwright_core::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
