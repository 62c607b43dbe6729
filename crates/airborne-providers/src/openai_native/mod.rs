use airborne_common::retry::{is_retryable, retry_with_backoff, RetryConfig};
use airborne_provider_core::capture::CaptureBuffer;
use airborne_provider_core::error::{ProviderError, ProviderResult};
use airborne_provider_core::provider::{Capabilities, Provider};
use airborne_provider_core::sse::SseParser;
use airborne_provider_core::types::{GenerateParams, GenerateResult, StreamChunk, Usage};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::messages::build_openai_messages;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI's Responses API. Distinct from the shared Chat-Completions adapter
/// because it alone among the providers here supports a native `file_search`
/// tool whose citations must be surfaced as ordered `StreamChunk::Citation`s.
pub struct OpenAiResponsesProvider {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl Default for OpenAiResponsesProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiResponsesProvider {
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
            .unwrap_or(DEFAULT_MODEL)
    }

    fn base_url<'a>(&self, params: &'a GenerateParams) -> &'a str {
        params
            .config
            .base_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
    }

    /// `file_store_id`, when present, is threaded through as a `file_search`
    /// tool rather than injected into `instructions` — the dispatcher only
    /// takes this path for providers whose `Capabilities::file_search` is
    /// true.
    fn build_body(&self, params: &GenerateParams, file_store_id: Option<&str>, stream: bool) -> Value {
        let input = build_openai_messages(&params.instructions, &params.conversation_history, &params.user_input);
        let mut body = json!({
            "model": self.model(params),
            "input": input,
            "stream": stream,
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = params.config.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(max_tokens) = params.config.max_output_tokens {
                obj.insert("max_output_tokens".to_string(), json!(max_tokens));
            }
            if let Some(store_id) = file_store_id {
                obj.insert(
                    "tools".to_string(),
                    json!([{"type": "file_search", "vector_store_ids": [store_id]}]),
                );
            }
        }
        body
    }

    async fn attempt_once(
        &self,
        params: &GenerateParams,
        body: &Value,
        capture: &mut CaptureBuffer,
    ) -> Result<Value, String> {
        if params.config.api_key.is_empty() {
            return Err("401 missing api key".to_string());
        }
        let url = format!("{}/responses", self.base_url(params));
        capture.record_request(&serde_json::to_vec(body).unwrap_or_default());
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
        capture.record_response(text.as_bytes());
        if !status.is_success() {
            return Err(format!("{} {}", status.as_u16(), text));
        }
        serde_json::from_str(&text).map_err(|e| format!("invalid json response: {e}"))
    }
}

#[async_trait]
impl Provider for OpenAiResponsesProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            file_search: true,
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
        let file_store_id = params.config.extra_options.0.get("file_store_id").cloned();
        let body = self.build_body(&params, file_store_id.as_deref(), false);
        let request_id = params.request_id.clone();
        let mut capture = CaptureBuffer::new();

        let value = retry_with_backoff(&self.retry, &cancel, &request_id, |_attempt| {
            self.attempt_once(&params, &body, &mut capture)
        })
        .await
        .map_err(ProviderError::Upstream)?;

        let text = extract_output_text(&value);
        let usage = Usage::new(
            value["usage"]["input_tokens"].as_u64().unwrap_or(0),
            value["usage"]["output_tokens"].as_u64().unwrap_or(0),
        );
        let (request_json, response_json) = capture.into_parts();

        Ok(GenerateResult {
            text,
            usage,
            model: value["model"].as_str().unwrap_or(self.model(&params)).to_string(),
            request_json,
            response_json,
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
        let file_store_id = params.config.extra_options.0.get("file_store_id").cloned();
        let body = self.build_body(&params, file_store_id.as_deref(), true);
        let url = format!("{}/responses", self.base_url(&params));

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
        let model = self.model(&params).to_string();
        let mut usage = Usage::default();
        let mut citation_index = 0u32;

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
                    Some("response.output_text.delta") => {
                        if let Some(text) = payload["delta"].as_str() {
                            if !text.is_empty() {
                                let _ = tx.send(StreamChunk::Text { text: text.to_string() }).await;
                            }
                        }
                    }
                    Some("response.output_text.annotation.added") => {
                        let annotation = &payload["annotation"];
                        let _ = tx
                            .send(StreamChunk::Citation {
                                file_id: annotation["file_id"].as_str().map(str::to_string),
                                start: annotation["start_index"].as_u64().unwrap_or(citation_index as u64) as u32,
                                end: annotation["end_index"].as_u64().unwrap_or(citation_index as u64) as u32,
                                snippet: annotation["quote"].as_str().map(str::to_string),
                            })
                            .await;
                        citation_index += 1;
                    }
                    Some("response.completed") => {
                        usage = Usage::new(
                            payload["response"]["usage"]["input_tokens"].as_u64().unwrap_or(0),
                            payload["response"]["usage"]["output_tokens"].as_u64().unwrap_or(0),
                        );
                    }
                    _ => {}
                }
            }
        }
        let _ = tx.send(StreamChunk::Complete { model, usage }).await;
        Ok(())
    }
}

fn extract_output_text(value: &Value) -> String {
    if let Some(text) = value["output_text"].as_str() {
        return text.to_string();
    }
    value["output"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .flat_map(|item| item["content"].as_array().cloned().unwrap_or_default())
                .filter_map(|content| content["text"].as_str().map(str::to_string))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_output_text_shortcut_field() {
        let value = json!({"output_text": "hello"});
        assert_eq!(extract_output_text(&value), "hello");
    }

    #[test]
    fn extracts_output_text_from_nested_content() {
        let value = json!({
            "output": [{"content": [{"text": "hel"}, {"text": "lo"}]}]
        });
        assert_eq!(extract_output_text(&value), "hello");
    }

    #[test]
    fn file_search_tool_is_attached_when_store_id_present() {
        let provider = OpenAiResponsesProvider::new();
        let params = GenerateParams {
            config: airborne_provider_core::provider::ProviderConfig {
                name: "openai".to_string(),
                api_key: "sk-x".to_string(),
                model: "".to_string(),
                base_url: None,
                temperature: None,
                top_p: None,
                max_output_tokens: None,
                extra_options: Default::default(),
            },
            instructions: String::new(),
            user_input: "hi".to_string(),
            conversation_history: vec![],
            override_model: None,
            request_id: "req-1".to_string(),
        };
        let body = provider.build_body(&params, Some("vs_123"), false);
        assert_eq!(body["tools"][0]["vector_store_ids"][0], "vs_123");
    }
}
