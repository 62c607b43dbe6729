use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Upstream(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;
