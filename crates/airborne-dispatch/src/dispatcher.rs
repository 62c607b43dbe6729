use std::sync::Arc;

use airborne_common::cmd::parse_command;
use airborne_common::cost::{CostRateTable, ZeroCostRateTable};
use airborne_common::error::AirborneError;
use airborne_common::retry::is_retryable;
use airborne_provider_core::error::ProviderError;
use airborne_provider_core::registry::ProviderRegistry;
use airborne_provider_core::types::{GenerateParams, StreamChunk};
use airborne_provider_core::validate::{
    request_id_or_generate, validate_generate_params, MAX_HISTORY_ENTRIES, MAX_INSTRUCTIONS_BYTES,
    MAX_USER_INPUT_BYTES,
};
use airborne_rag::RagService;
use airborne_tenant::{config::TenantConfig, TenantStore};
use tokio::sync::mpsc;
use tracing::{error, info, instrument};

use crate::request::{DispatchOutcome, DispatchRequest, DispatchResult};

/// Maps a provider failure to a client-safe error. The raw upstream cause
/// (which may be the literal response body) is logged keyed by
/// `request_id` and never returned; the client only ever sees a generic
/// `Unavailable`/`ResourceExhausted` message.
fn map_provider_error(err: ProviderError, request_id: &str) -> AirborneError {
    match err {
        ProviderError::InvalidConfig(msg) => AirborneError::FailedPrecondition(msg),
        ProviderError::Upstream(cause) => {
            let retryable = is_retryable(&cause);
            error!(request_id, cause = %cause, "upstream call failed");
            if retryable {
                AirborneError::ResourceExhausted("upstream provider is temporarily unavailable".to_string())
            } else {
                AirborneError::Unavailable("upstream provider rejected the request".to_string())
            }
        }
    }
}

pub struct Dispatcher {
    registry: ProviderRegistry,
    tenants: TenantStore,
    rag: Option<Arc<RagService>>,
    cost_table: Arc<dyn CostRateTable>,
    default_provider: Option<String>,
}

impl Dispatcher {
    pub fn new(registry: ProviderRegistry, tenants: TenantStore) -> Self {
        Self {
            registry,
            tenants,
            rag: None,
            cost_table: Arc::new(ZeroCostRateTable),
            default_provider: None,
        }
    }

    pub fn with_rag(mut self, rag: Arc<RagService>) -> Self {
        self.rag = Some(rag);
        self
    }

    pub fn with_cost_table(mut self, table: Arc<dyn CostRateTable>) -> Self {
        self.cost_table = table;
        self
    }

    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = Some(provider.into());
        self
    }

    /// Re-reads the tenant directory in place. Safe to call from a signal
    /// handler: a bad file leaves the previous snapshot untouched.
    pub fn reload_tenants(&self) -> Result<(), airborne_tenant::TenantStoreError> {
        self.tenants.reload()
    }

    fn reject_oversized_input(&self, request: &DispatchRequest) -> Result<(), AirborneError> {
        if request.user_input.len() > MAX_USER_INPUT_BYTES {
            return Err(AirborneError::InvalidArgument(format!(
                "user input exceeds {MAX_USER_INPUT_BYTES} bytes"
            )));
        }
        if request.instructions.len() > MAX_INSTRUCTIONS_BYTES {
            return Err(AirborneError::InvalidArgument(format!(
                "instructions exceed {MAX_INSTRUCTIONS_BYTES} bytes"
            )));
        }
        if request.conversation_history.len() > MAX_HISTORY_ENTRIES {
            return Err(AirborneError::InvalidArgument(format!(
                "conversation history exceeds {MAX_HISTORY_ENTRIES} entries"
            )));
        }
        Ok(())
    }

    fn resolve_tenant(&self, tenant_id: Option<&str>) -> Result<Arc<TenantConfig>, AirborneError> {
        match tenant_id {
            Some(id) => self
                .tenants
                .get(id)
                .ok_or_else(|| AirborneError::NotFound(format!("tenant {id}"))),
            None => self
                .tenants
                .sole_tenant()
                .ok_or_else(|| AirborneError::FailedPrecondition("no tenant specified and gateway is multi-tenant".to_string())),
        }
    }

    fn resolve_provider_name(&self, request: &DispatchRequest, tenant: &TenantConfig) -> Result<String, AirborneError> {
        request
            .provider
            .clone()
            .or_else(|| tenant.default_provider.clone())
            .or_else(|| self.default_provider.clone())
            .ok_or_else(|| AirborneError::FailedPrecondition("no provider specified and no default configured".to_string()))
    }

    /// Shared setup for both the unary and streaming call paths: validate,
    /// parse commands, resolve tenant/provider, build the per-call config,
    /// and (if relevant) inject retrieved RAG context.
    async fn prepare(
        &self,
        request: &DispatchRequest,
    ) -> Result<PreparedCall, AirborneError> {
        self.reject_oversized_input(request)?;
        let request_id = request_id_or_generate(request.request_id.as_deref());

        let outcome = parse_command(&request.user_input, &request.image_triggers);
        if outcome.skip_ai {
            return Ok(PreparedCall::ShortCircuit(if let Some(prompt) = outcome.image_prompt {
                DispatchOutcome::ImagePrompt(prompt)
            } else {
                DispatchOutcome::Skipped
            }));
        }

        let tenant = self.resolve_tenant(request.tenant_id.as_deref())?;
        let provider_name = self.resolve_provider_name(request, &tenant)?;
        let provider = self
            .registry
            .get(&provider_name)
            .ok_or_else(|| AirborneError::NotFound(format!("provider {provider_name}")))?;

        let mut config = airborne_tenant::build_provider_config(&tenant, &provider_name, &request.overrides)
            .map_err(|e| AirborneError::FailedPrecondition(e.to_string()))?;

        let mut instructions = request.instructions.clone();
        if !request.rag_store_ids.is_empty() {
            if let Some(rag) = &self.rag {
                if provider.capabilities().file_search {
                    if let Some(store_id) = request.rag_store_ids.first() {
                        config.extra_options.0.insert("file_store_id".to_string(), store_id.clone());
                    }
                } else {
                    let hits = rag
                        .retrieve_or_degrade(&tenant.tenant_id, &request.rag_store_ids, &outcome.processed_text, None)
                        .await;
                    if !hits.is_empty() {
                        let block = RagService::format_context_block(&hits);
                        instructions = format!("{instructions}\n{block}");
                    }
                }
            }
        }

        let params = GenerateParams {
            config,
            instructions,
            user_input: outcome.processed_text,
            conversation_history: request.conversation_history.clone(),
            override_model: request.model.clone(),
            request_id,
        };
        validate_generate_params(&params).map_err(|e| AirborneError::InvalidArgument(e.to_string()))?;

        Ok(PreparedCall::Ready {
            provider,
            params,
            provider_name,
        })
    }

    #[instrument(skip(self, request), fields(tenant_id = request.tenant_id.as_deref().unwrap_or("")))]
    pub async fn generate_reply(&self, request: DispatchRequest) -> Result<DispatchOutcome, AirborneError> {
        let cancel = request.cancel.clone();
        let prepared = self.prepare(&request).await?;
        let (provider, params, provider_name) = match prepared {
            PreparedCall::ShortCircuit(outcome) => return Ok(outcome),
            PreparedCall::Ready { provider, params, provider_name } => (provider, params, provider_name),
        };

        let model = params.override_model.clone().unwrap_or_else(|| params.config.model.clone());
        let request_id = params.request_id.clone();
        let result = provider
            .generate_reply(params, cancel)
            .await
            .map_err(|e| map_provider_error(e, &request_id))?;

        let rate = self.cost_table.rate(&provider_name, &model);
        let cost_usd = rate.cost(result.usage.input_tokens, result.usage.output_tokens) + result.grounding_cost_usd;
        info!(provider = %provider_name, tokens = result.usage.total_tokens, cost_usd, "call completed");

        Ok(DispatchOutcome::Generated(DispatchResult {
            generate: result,
            cost_usd,
        }))
    }

    pub async fn generate_reply_stream(
        &self,
        request: DispatchRequest,
        tx: mpsc::Sender<StreamChunk>,
    ) -> Result<DispatchOutcome, AirborneError> {
        let cancel = request.cancel.clone();
        let prepared = self.prepare(&request).await?;
        let (provider, params, _provider_name) = match prepared {
            PreparedCall::ShortCircuit(outcome) => return Ok(outcome),
            PreparedCall::Ready { provider, params, provider_name } => (provider, params, provider_name),
        };

        let request_id = params.request_id.clone();
        provider
            .generate_reply_stream(params, tx, cancel)
            .await
            .map_err(|e| map_provider_error(e, &request_id))?;
        Ok(DispatchOutcome::Skipped)
    }
}

enum PreparedCall {
    ShortCircuit(DispatchOutcome),
    Ready {
        provider: Arc<dyn airborne_provider_core::provider::Provider>,
        params: GenerateParams,
        provider_name: String,
    },
}
