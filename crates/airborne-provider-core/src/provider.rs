use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderResult;
use crate::types::{ExtraOptions, GenerateParams, GenerateResult, StreamChunk};

/// Config for a single call, after the tenant/request merge in
/// `airborne-tenant`'s config builder has run. `api_key` can only ever have
/// come from tenant configuration — the builder enforces that, not this type.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub name: String,
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub extra_options: ExtraOptions,
}

/// Capability predicates a dispatcher consults before building a call plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub file_search: bool,
    pub web_search: bool,
    pub native_continuity: bool,
    pub streaming: bool,
}

/// Uniform contract every upstream provider implements. `GenerateReply` and
/// `GenerateReplyStream` share the same guarantees (see module docs on each
/// adapter crate): immediate failure on a missing API key, a per-attempt
/// timeout, retry per the shared classifier, and role/content normalization
/// before the wire request is built. `cancel` is the call's cancellation
/// context: a provider must observe it in its retry backoff and in any
/// streaming read loop, and a cancelled call must never emit a
/// `StreamChunk::Complete`.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn supports_streaming(&self) -> bool {
        self.capabilities().streaming
    }

    async fn generate_reply(
        &self,
        params: GenerateParams,
        cancel: CancellationToken,
    ) -> ProviderResult<GenerateResult>;

    /// Streams chunks on `tx`. The receiving end reads until the channel
    /// closes, which is only guaranteed to happen after exactly one terminal
    /// `StreamChunk::Complete` or `StreamChunk::Error` has been sent.
    async fn generate_reply_stream(
        &self,
        params: GenerateParams,
        tx: mpsc::Sender<StreamChunk>,
        cancel: CancellationToken,
    ) -> ProviderResult<()>;
}
