use thiserror::Error;

/// Gateway-wide error taxonomy. Every boundary crate (`airborne-provider-core`,
/// `airborne-tenant`, `airborne-rag`) defines its own narrower error enum and
/// converts into this one at the dispatcher boundary, so a caller never has to
/// match on provider- or tenant-specific variants.
#[derive(Debug, Error)]
pub enum AirborneError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("permission denied")]
    PermissionDenied,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("internal error")]
    Internal(#[source] InternalCause),
}

/// Wraps the real cause of an internal error. `Display` never surfaces it —
/// only `tracing` call sites that hold the `AirborneError` before sanitizing
/// should log `{:?}`.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct InternalCause(pub String);

impl AirborneError {
    /// Message safe to return to a client: never leaks API keys, raw upstream
    /// bodies, or file paths. `Unavailable`/`ResourceExhausted` carry an
    /// upstream-derived cause internally (see `Display`), so they're
    /// sanitized here the same as `Internal` — callers that need the raw
    /// cause should log `{:?}` before converting to this message.
    pub fn public_message(&self) -> String {
        match self {
            AirborneError::Internal(_) => "internal error".to_string(),
            AirborneError::Unavailable(_) => "upstream provider is unavailable".to_string(),
            AirborneError::ResourceExhausted(_) => "rate limited, retry later".to_string(),
            other => other.to_string(),
        }
    }

    pub fn internal(cause: impl Into<String>) -> Self {
        AirborneError::Internal(InternalCause(cause.into()))
    }
}
