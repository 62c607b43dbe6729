use airborne_common::retry::{is_retryable, retry_with_backoff, RetryConfig};
use airborne_provider_core::error::{ProviderError, ProviderResult};
use airborne_provider_core::provider::{Capabilities, Provider};
use airborne_provider_core::sse::SseParser;
use airborne_provider_core::types::{GenerateParams, GenerateResult, Message, Role, StreamChunk, Usage};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AnthropicProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            retry: RetryConfig::default(),
        }
    }

    fn model<'a>(&'a self, params: &'a GenerateParams) -> &'a str {
        params
            .override_model
            .as_deref()
            .filter(|m| !m.is_empty())
            .or_else(|| (!params.config.model.is_empty()).then_some(params.config.model.as_str()))
            .unwrap_or("claude-3-5-sonnet-latest")
    }

    fn base_url<'a>(&self, params: &'a GenerateParams) -> &'a str {
        params
            .config
            .base_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
    }

    /// Claude requires the first turn of `messages` to be `user`. If history
    /// begins with `assistant`, a synthetic continuation turn is prepended so
    /// a mid-conversation resume doesn't break the wire contract.
    fn build_messages(&self, params: &GenerateParams) -> Vec<Value> {
        let mut out = Vec::with_capacity(params.conversation_history.len() + 2);
        let starts_with_assistant = params
            .conversation_history
            .iter()
            .find(|m| !m.content.trim().is_empty())
            .map(|m| matches!(m.role, Role::Assistant))
            .unwrap_or(false);
        if starts_with_assistant {
            out.push(json!({"role": "user", "content": "[continuing conversation]"}));
        }
        for msg in &params.conversation_history {
            if msg.content.trim().is_empty() {
                continue;
            }
            let role = match msg.role {
                Role::Assistant => "assistant",
                Role::User | Role::System => "user",
            };
            out.push(json!({"role": role, "content": msg.content}));
        }
        let trimmed = params.user_input.trim();
        if !trimmed.is_empty() {
            out.push(json!({"role": "user", "content": trimmed}));
        }
        out
    }

    fn build_body(&self, params: &GenerateParams, stream: bool) -> Value {
        let max_tokens = params.config.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let mut body = json!({
            "model": self.model(params),
            "max_tokens": max_tokens,
            "messages": self.build_messages(params),
            "stream": stream,
        });
        if !params.instructions.trim().is_empty() {
            body["system"] = json!(params.instructions);
        }
        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = params.config.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(p) = params.config.top_p {
                obj.insert("top_p".to_string(), json!(p));
            }
        }
        body
    }

    async fn attempt_once(&self, params: &GenerateParams, body: &Value) -> Result<Value, String> {
        if params.config.api_key.is_empty() {
            return Err("401 missing api key".to_string());
        }
        let url = format!("{}/messages", self.base_url(params));
        let fut = self
            .client
            .post(&url)
            .header("x-api-key", &params.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            file_search: false,
            web_search: false,
            native_continuity: false,
            streaming: true,
        }
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
        let value = retry_with_backoff(&self.retry, &cancel, &request_id, |_attempt| {
            self.attempt_once(&params, &body)
        })
        .await
        .map_err(ProviderError::Upstream)?;

        let text = value["content"]
            .as_array()
            .and_then(|blocks| blocks.iter().find(|b| b["type"] == "text"))
            .and_then(|b| b["text"].as_str())
            .unwrap_or_default()
            .to_string();

        let input_tokens = value["usage"]["input_tokens"].as_u64().unwrap_or(0);
        let output_tokens = value["usage"]["output_tokens"].as_u64().unwrap_or(0);

        Ok(GenerateResult {
            text,
            usage: Usage::new(input_tokens, output_tokens),
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
        let url = format!("{}/messages", self.base_url(&params));
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &params.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
        let model = self.model(&params).to_string();
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
                let Ok(payload): Result<Value, _> = serde_json::from_str(&event.data) else {
                    continue;
                };
                match event.event.as_deref() {
                    Some("content_block_delta") => {
                        if let Some(text) = payload["delta"]["text"].as_str() {
                            if !text.is_empty() {
                                let _ = tx.send(StreamChunk::Text { text: text.to_string() }).await;
                            }
                        }
                    }
                    Some("message_delta") => {
                        if let Some(out) = payload["usage"]["output_tokens"].as_u64() {
                            usage.output_tokens = out;
                        }
                    }
                    Some("message_start") => {
                        if let Some(inp) = payload["message"]["usage"]["input_tokens"].as_u64() {
                            usage.input_tokens = inp;
                        }
                    }
                    Some("error") => {
                        let cause = payload["error"]["message"]
                            .as_str()
                            .unwrap_or("upstream error")
                            .to_string();
                        let retryable = is_retryable(&cause);
                        let _ = tx.send(StreamChunk::Error { cause, retryable }).await;
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }
        usage.total_tokens = usage.input_tokens + usage.output_tokens;
        let _ = tx.send(StreamChunk::Complete { model, usage }).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airborne_provider_core::provider::ProviderConfig;

    fn params_with_history(history: Vec<Message>) -> GenerateParams {
        GenerateParams {
            config: ProviderConfig {
                name: "anthropic".to_string(),
                api_key: "sk-ant".to_string(),
                model: "".to_string(),
                base_url: None,
                temperature: None,
                top_p: None,
                max_output_tokens: None,
                extra_options: Default::default(),
            },
            instructions: "be terse".to_string(),
            user_input: "continue".to_string(),
            conversation_history: history,
            override_model: None,
            request_id: "req-1".to_string(),
        }
    }

    #[test]
    fn prepends_synthetic_turn_when_history_starts_with_assistant() {
        let provider = AnthropicProvider::new();
        let params = params_with_history(vec![Message {
            role: Role::Assistant,
            content: "earlier reply".to_string(),
        }]);
        let msgs = provider.build_messages(&params);
        assert_eq!(msgs[0]["role"], "user");
        assert_eq!(msgs[0]["content"], "[continuing conversation]");
        assert_eq!(msgs[1]["role"], "assistant");
    }

    #[test]
    fn no_synthetic_turn_when_history_starts_with_user() {
        let provider = AnthropicProvider::new();
        let params = params_with_history(vec![Message {
            role: Role::User,
            content: "hi".to_string(),
        }]);
        let msgs = provider.build_messages(&params);
        assert_eq!(msgs[0]["content"], "hi");
    }

    #[test]
    fn max_tokens_defaults_to_4096_when_unset() {
        let provider = AnthropicProvider::new();
        let params = params_with_history(vec![]);
        let body = provider.build_body(&params, false);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }
}
