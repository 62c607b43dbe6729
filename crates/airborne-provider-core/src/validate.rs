use thiserror::Error;
use uuid::Uuid;

use crate::types::GenerateParams;

pub const MAX_USER_INPUT_BYTES: usize = 100 * 1024;
pub const MAX_INSTRUCTIONS_BYTES: usize = 50 * 1024;
pub const MAX_HISTORY_ENTRIES: usize = 100;
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const MAX_REQUEST_ID_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("user input exceeds {0} bytes")]
    UserInputTooLarge(usize),
    #[error("instructions exceed {0} bytes")]
    InstructionsTooLarge(usize),
    #[error("conversation history exceeds {0} entries")]
    HistoryTooLong(usize),
    #[error("upload exceeds {0} bytes")]
    UploadTooLarge(u64),
    #[error("request id contains invalid characters or is too long")]
    InvalidRequestId,
    #[error("provider url must be an absolute http(s) url")]
    UrlNotAbsolute,
    #[error("provider url host is not permitted: {0}")]
    UrlHostNotAllowed(String),
}

pub fn validate_generate_params(params: &GenerateParams) -> Result<(), ValidationError> {
    if params.user_input.len() > MAX_USER_INPUT_BYTES {
        return Err(ValidationError::UserInputTooLarge(MAX_USER_INPUT_BYTES));
    }
    if params.instructions.len() > MAX_INSTRUCTIONS_BYTES {
        return Err(ValidationError::InstructionsTooLarge(MAX_INSTRUCTIONS_BYTES));
    }
    if params.conversation_history.len() > MAX_HISTORY_ENTRIES {
        return Err(ValidationError::HistoryTooLong(MAX_HISTORY_ENTRIES));
    }
    if let Some(base_url) = &params.config.base_url {
        validate_provider_url(base_url, false)?;
    }
    Ok(())
}

pub fn validate_upload_size(declared: u64, accumulated: u64) -> Result<(), ValidationError> {
    if declared > MAX_UPLOAD_BYTES || accumulated > MAX_UPLOAD_BYTES {
        return Err(ValidationError::UploadTooLarge(MAX_UPLOAD_BYTES));
    }
    Ok(())
}

/// Validates or generates a request id. Returns a fresh UUIDv4 when `id` is
/// `None` or fails the charset/length check, rather than erroring the call —
/// log-injection defence shouldn't itself be a source of failed requests.
pub fn request_id_or_generate(id: Option<&str>) -> String {
    match id {
        Some(candidate) if is_valid_request_id(candidate) => candidate.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

fn is_valid_request_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// SSRF guard for a configured provider base URL. `allow_private` opts a
/// self-hosted provider out of the loopback/link-local/private-range block.
pub fn validate_provider_url(url: &str, allow_private: bool) -> Result<(), ValidationError> {
    let parsed = url::Url::parse(url).map_err(|_| ValidationError::UrlNotAbsolute)?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ValidationError::UrlNotAbsolute);
    }
    let host = parsed.host_str().ok_or(ValidationError::UrlNotAbsolute)?;
    if !allow_private && is_disallowed_host(host) {
        return Err(ValidationError::UrlHostNotAllowed(host.to_string()));
    }
    Ok(())
}

fn is_disallowed_host(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return is_loopback_link_local_or_private(&ip);
    }
    false
}

fn is_loopback_link_local_or_private(ip: &std::net::IpAddr) -> bool {
    match ip {
        std::net::IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_link_local() || v4.is_private() || v4.is_unspecified()
        }
        std::net::IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
