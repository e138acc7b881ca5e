use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to generate private key: {0}")]
    KeyGenerationFailed(#[source] anyhow::Error),
    #[error("failed to generate serial number: {0}")]
    SerialNumberFailed(#[source] anyhow::Error),
    #[error("failed to create certificate: {0}")]
    SigningFailed(#[source] anyhow::Error),
}
