use airborne_common::retry::{is_retryable, RetryConfig};
use airborne_provider_core::error::{ProviderError, ProviderResult};
use airborne_provider_core::provider::{Capabilities, Provider};
use airborne_provider_core::sse::SseParser;
use airborne_provider_core::types::{GenerateParams, GenerateResult, StreamChunk, Usage};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::messages::build_openai_messages;

/// Static description of one OpenAI-compatible vendor. The same
/// `OpenAiCompatProvider` implementation is instantiated once per vendor
/// (DeepSeek, Grok, Mistral, Cerebras, Fireworks, Perplexity, OpenRouter,
/// DeepInfra, …) parameterized by one of these.
#[derive(Debug, Clone, Copy)]
pub struct ProviderProfile {
    pub name: &'static str,
    pub default_base_url: &'static str,
    pub default_model: &'static str,
    pub capabilities: Capabilities,
}

pub const DEEPSEEK: ProviderProfile = ProviderProfile {
    name: "deepseek",
    default_base_url: "https://api.deepseek.com/v1",
    default_model: "deepseek-chat",
    capabilities: Capabilities { file_search: false, web_search: false, native_continuity: false, streaming: true },
};

pub const GROK: ProviderProfile = ProviderProfile {
    name: "grok",
    default_base_url: "https://api.x.ai/v1",
    default_model: "grok-2-latest",
    capabilities: Capabilities { file_search: false, web_search: true, native_continuity: false, streaming: true },
};

pub const MISTRAL: ProviderProfile = ProviderProfile {
    name: "mistral",
    default_base_url: "https://api.mistral.ai/v1",
    default_model: "mistral-large-latest",
    capabilities: Capabilities { file_search: false, web_search: false, native_continuity: false, streaming: true },
};

pub const CEREBRAS: ProviderProfile = ProviderProfile {
    name: "cerebras",
    default_base_url: "https://api.cerebras.ai/v1",
    default_model: "llama3.1-70b",
    capabilities: Capabilities { file_search: false, web_search: false, native_continuity: false, streaming: true },
};

pub const FIREWORKS: ProviderProfile = ProviderProfile {
    name: "fireworks",
    default_base_url: "https://api.fireworks.ai/inference/v1",
    default_model: "accounts/fireworks/models/llama-v3p1-70b-instruct",
    capabilities: Capabilities { file_search: false, web_search: false, native_continuity: false, streaming: true },
};

pub const PERPLEXITY: ProviderProfile = ProviderProfile {
    name: "perplexity",
    default_base_url: "https://api.perplexity.ai",
    default_model: "sonar",
    capabilities: Capabilities { file_search: false, web_search: true, native_continuity: false, streaming: true },
};

pub const OPENROUTER: ProviderProfile = ProviderProfile {
    name: "openrouter",
    default_base_url: "https://openrouter.ai/api/v1",
    default_model: "openrouter/auto",
    capabilities: Capabilities { file_search: false, web_search: false, native_continuity: false, streaming: true },
};

pub const DEEPINFRA: ProviderProfile = ProviderProfile {
    name: "deepinfra",
    default_base_url: "https://api.deepinfra.com/v1/openai",
    default_model: "meta-llama/Meta-Llama-3.1-70B-Instruct",
    capabilities: Capabilities { file_search: false, web_search: false, native_continuity: false, streaming: true },
};

pub struct OpenAiCompatProvider {
    profile: ProviderProfile,
    client: reqwest::Client,
    retry: RetryConfig,
}

impl OpenAiCompatProvider {
    pub fn new(profile: ProviderProfile) -> Self {
        Self {
            profile,
            client: reqwest::Client::new(),
            retry: RetryConfig::default(),
        }
    }

    fn base_url<'a>(&self, override_url: &'a Option<String>) -> &'a str {
        match override_url {
            Some(url) if !url.is_empty() => url.as_str(),
            _ => self.profile.default_base_url,
        }
    }

    fn model<'a>(&'a self, params: &'a GenerateParams) -> &'a str {
        if let Some(m) = &params.override_model {
            if !m.is_empty() {
                return m;
            }
        }
        if !params.config.model.is_empty() {
            return &params.config.model;
        }
        self.profile.default_model
    }

    fn build_body(&self, params: &GenerateParams, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model(params),
            "messages": build_openai_messages(&params.instructions, &params.conversation_history, &params.user_input),
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = params.config.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(p) = params.config.top_p {
                obj.insert("top_p".to_string(), json!(p));
            }
            if let Some(max_tokens) = params.config.max_output_tokens {
                obj.insert("max_tokens".to_string(), json!(max_tokens));
            }
            for (k, v) in &params.config.extra_options.0 {
                obj.insert(k.clone(), json!(v));
            }
            if stream {
                obj.insert("stream".to_string(), json!(true));
                obj.insert(
                    "stream_options".to_string(),
                    json!({"include_usage": true}),
                );
            }
        }
        body
    }

    async fn attempt_once(&self, params: &GenerateParams, body: &Value) -> Result<Value, String> {
        if params.config.api_key.is_empty() {
            return Err("401 missing api key".to_string());
        }
        let url = format!("{}/chat/completions", self.base_url(&params.config.base_url));
        let fut = self
            .client
            .post(&url)
            .bearer_auth(&params.config.api_key)
            .json(body)
            .send();
        let response = tokio::time::timeout(self.retry.request_timeout, fut)
            .await
            .map_err(|_| "timeout: request deadline exceeded".to_string())?
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let text = response.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!("{} {}", status.as_u16(), text));
        }
        serde_json::from_str(&text).map_err(|e| format!("invalid json response: {e}"))
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        self.profile.name
    }

    fn capabilities(&self) -> Capabilities {
        self.profile.capabilities
    }

    async fn generate_reply(
        &self,
        params: GenerateParams,
        cancel: CancellationToken,
    ) -> ProviderResult<GenerateResult> {
        if params.config.api_key.is_empty() {
            return Err(ProviderError::InvalidConfig("missing api key".to_string()));
        }
        let body = self.build_body(&params, false);
        let request_id = params.request_id.clone();

        let value = airborne_common::retry::retry_with_backoff(
            &self.retry,
            &cancel,
            &request_id,
            |_attempt| self.attempt_once(&params, &body),
        )
        .await
        .map_err(ProviderError::Upstream)?;

        let text = value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if text.is_empty() {
            warn!(request_id = %request_id, provider = self.profile.name, "empty response");
        }
        let usage = Usage {
            input_tokens: value["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: value["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            total_tokens: value["usage"]["total_tokens"].as_u64().unwrap_or(0),
        };
        Ok(GenerateResult {
            text,
            usage,
            model: value["model"].as_str().unwrap_or(self.model(&params)).to_string(),
            request_json: Some(serde_json::to_vec(&body).unwrap_or_default()),
            response_json: Some(serde_json::to_vec(&value).unwrap_or_default()),
            grounding_queries: 0,
            grounding_cost_usd: 0.0,
        })
    }

    async fn generate_reply_stream(
        &self,
        params: GenerateParams,
        tx: mpsc::Sender<StreamChunk>,
        cancel: CancellationToken,
    ) -> ProviderResult<()> {
        if params.config.api_key.is_empty() {
            return Err(ProviderError::InvalidConfig("missing api key".to_string()));
        }
        if cancel.is_cancelled() {
            let _ = tx.send(StreamChunk::Error { cause: "cancelled".to_string(), retryable: false }).await;
            return Ok(());
        }
        let body = self.build_body(&params, true);
        let url = format!("{}/chat/completions", self.base_url(&params.config.base_url));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&params.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let cause = format!("{} {}", status.as_u16(), text);
            let retryable = is_retryable(&cause);
            let _ = tx.send(StreamChunk::Error { cause, retryable }).await;
            return Ok(());
        }

        let mut parser = SseParser::new();
        let mut stream = response.bytes_stream();
        let mut model = self.model(&params).to_string();
        let mut usage = Usage::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = tx.send(StreamChunk::Error { cause: "cancelled".to_string(), retryable: false }).await;
                    return Ok(());
                }
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = next else { break };
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    let cause = e.to_string();
                    let retryable = is_retryable(&cause);
                    let _ = tx.send(StreamChunk::Error { cause, retryable }).await;
                    return Ok(());
                }
            };
            for event in parser.push_bytes(&bytes) {
                if event.data == "[DONE]" {
                    let _ = tx
                        .send(StreamChunk::Complete {
                            model: model.clone(),
                            usage: usage.clone(),
                        })
                        .await;
                    return Ok(());
                }
                let Ok(delta): Result<Value, _> = serde_json::from_str(&event.data) else {
                    continue;
                };
                if let Some(m) = delta["model"].as_str() {
                    model = m.to_string();
                }
                if let Some(u) = delta.get("usage") {
                    usage = Usage {
                        input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0),
                        output_tokens: u["completion_tokens"].as_u64().unwrap_or(0),
                        total_tokens: u["total_tokens"].as_u64().unwrap_or(0),
                    };
                }
                if let Some(text) = delta["choices"][0]["delta"]["content"].as_str() {
                    if !text.is_empty() {
                        let _ = tx.send(StreamChunk::Text { text: text.to_string() }).await;
                    }
                }
            }
        }

        for event in parser.finish() {
            if let Ok(delta) = serde_json::from_str::<Value>(&event.data) {
                if let Some(text) = delta["choices"][0]["delta"]["content"].as_str() {
                    if !text.is_empty() {
                        let _ = tx.send(StreamChunk::Text { text: text.to_string() }).await;
                    }
                }
            }
        }
        let _ = tx.send(StreamChunk::Complete { model, usage }).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airborne_provider_core::provider::ProviderConfig;

    fn params(api_key: &str) -> GenerateParams {
        GenerateParams {
            config: ProviderConfig {
                name: "deepseek".to_string(),
                api_key: api_key.to_string(),
                model: "".to_string(),
                base_url: None,
                temperature: Some(0.5),
                top_p: None,
                max_output_tokens: None,
                extra_options: Default::default(),
            },
            instructions: "be terse".to_string(),
            user_input: "hi".to_string(),
            conversation_history: vec![],
            override_model: None,
            request_id: "req-1".to_string(),
        }
    }

    #[test]
    fn model_precedence_override_then_config_then_default() {
        let provider = OpenAiCompatProvider::new(DEEPSEEK);
        let mut p = params("sk-x");
        assert_eq!(provider.model(&p), DEEPSEEK.default_model);
        p.config.model = "deepseek-reasoner".to_string();
        assert_eq!(provider.model(&p), "deepseek-reasoner");
        p.override_model = Some("deepseek-coder".to_string());
        assert_eq!(provider.model(&p), "deepseek-coder");
    }

    #[test]
    fn base_url_precedence_config_over_default() {
        let provider = OpenAiCompatProvider::new(DEEPSEEK);
        let mut override_url = None;
        assert_eq!(provider.base_url(&override_url), DEEPSEEK.default_base_url);
        override_url = Some("https://custom.example.com/v1".to_string());
        assert_eq!(provider.base_url(&override_url), "https://custom.example.com/v1");
    }

    #[tokio::test]
    async fn missing_api_key_fails_immediately_without_retry() {
        let provider = OpenAiCompatProvider::new(DEEPSEEK);
        let result = provider.generate_reply(params(""), CancellationToken::new()).await;
        assert!(matches!(result, Err(ProviderError::InvalidConfig(_))));
    }
}
