pub mod capture;
pub mod error;
pub mod provider;
pub mod registry;
pub mod sse;
pub mod types;
pub mod validate;

pub use capture::CaptureBuffer;
pub use error::ProviderError;
pub use provider::{Provider, ProviderConfig};
pub use registry::ProviderRegistry;
pub use sse::{SseEvent, SseParser};
pub use types::{
    GenerateParams, GenerateResult, Message, Role, StreamChunk, Usage,
};
pub use validate::{validate_generate_params, validate_provider_url, ValidationError};
