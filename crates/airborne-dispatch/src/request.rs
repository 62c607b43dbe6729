use airborne_provider_core::types::{GenerateResult, Message};
use airborne_tenant::RequestOverrides;
use tokio_util::sync::CancellationToken;

/// Inbound call, one step removed from whatever RPC surface fronts the
/// gateway (that surface is out of scope here — it only needs to construct
/// this struct and read back a `DispatchOutcome`).
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub tenant_id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub instructions: String,
    pub user_input: String,
    pub conversation_history: Vec<Message>,
    pub request_id: Option<String>,
    pub image_triggers: Vec<String>,
    pub rag_store_ids: Vec<String>,
    pub overrides: RequestOverrides,
    /// Cancellation context for this call. Cloned into the provider before
    /// dispatch so cancelling it mid-flight aborts the retry backoff and any
    /// in-progress streaming read loop.
    pub cancel: CancellationToken,
}

impl Default for DispatchRequest {
    fn default() -> Self {
        Self {
            tenant_id: None,
            provider: None,
            model: None,
            instructions: String::new(),
            user_input: String::new(),
            conversation_history: Vec::new(),
            request_id: None,
            image_triggers: Vec::new(),
            rag_store_ids: Vec::new(),
            overrides: RequestOverrides::default(),
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Generated(DispatchResult),
    ImagePrompt(String),
    Skipped,
}

#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub generate: GenerateResult,
    pub cost_usd: f64,
}
