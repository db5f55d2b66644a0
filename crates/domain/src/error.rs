use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("channel unavailable: {0}")]
    ChannelUnavailable(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("duplicate submission: {0}")]
    DuplicateSubmission(String),
}
