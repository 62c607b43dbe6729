use airborne_common::cost::CostRate;
use airborne_common::retry::{is_retryable, retry_with_backoff, RetryConfig};
use airborne_provider_core::error::{ProviderError, ProviderResult};
use airborne_provider_core::provider::{Capabilities, Provider};
use airborne_provider_core::sse::SseParser;
use airborne_provider_core::types::{GenerateParams, GenerateResult, Role, StreamChunk, Usage};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-pro";

/// Per-query price for Google Search grounding, the one cost component this
/// gateway cannot derive from token usage alone. Overridable via
/// `extra_options.grounding_cost_per_query` so a deployment's actual
/// contracted rate doesn't have to be a code change.
const DEFAULT_GROUNDING_COST_PER_QUERY: f64 = 0.035;

pub struct GeminiProvider {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiProvider {
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

    fn grounding_enabled(&self, params: &GenerateParams) -> bool {
        params
            .config
            .extra_options
            .0
            .get("enable_grounding")
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    fn grounding_cost_rate(&self, params: &GenerateParams) -> CostRate {
        let per_query = params
            .config
            .extra_options
            .0
            .get("grounding_cost_per_query")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(DEFAULT_GROUNDING_COST_PER_QUERY);
        CostRate {
            input_per_1k: per_query,
            output_per_1k: 0.0,
        }
    }

    fn build_body(&self, params: &GenerateParams) -> Value {
        let mut contents = Vec::new();
        for msg in &params.conversation_history {
            if msg.content.trim().is_empty() {
                continue;
            }
            let role = match msg.role {
                Role::Assistant => "model",
                Role::User | Role::System => "user",
            };
            contents.push(json!({"role": role, "parts": [{"text": msg.content}]}));
        }
        let trimmed = params.user_input.trim();
        if !trimmed.is_empty() {
            contents.push(json!({"role": "user", "parts": [{"text": trimmed}]}));
        }

        let mut body = json!({ "contents": contents });
        if !params.instructions.trim().is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": params.instructions}]});
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(t) = params.config.temperature {
            generation_config.insert("temperature".to_string(), json!(t));
        }
        if let Some(p) = params.config.top_p {
            generation_config.insert("topP".to_string(), json!(p));
        }
        if let Some(max_tokens) = params.config.max_output_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }

        if self.grounding_enabled(params) {
            body["tools"] = json!([{"google_search": {}}]);
        }
        body
    }

    async fn attempt_once(&self, params: &GenerateParams, body: &Value, stream: bool) -> Result<Value, String> {
        if params.config.api_key.is_empty() {
            return Err("401 missing api key".to_string());
        }
        let action = if stream { "streamGenerateContent" } else { "generateContent" };
        let url = format!(
            "{}/models/{}:{}?key={}",
            self.base_url(params),
            self.model(params),
            action,
            params.config.api_key
        );
        let fut = self.client.post(&url).json(body).send();
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
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            file_search: false,
            web_search: true,
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
        let body = self.build_body(&params);
        let request_id = params.request_id.clone();
        let value = retry_with_backoff(&self.retry, &cancel, &request_id, |_attempt| {
            self.attempt_once(&params, &body, false)
        })
        .await
        .map_err(ProviderError::Upstream)?;

        let text = value["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage = Usage::new(
            value["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0),
            value["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0),
        );

        let grounding_queries = value["candidates"][0]["groundingMetadata"]["webSearchQueries"]
            .as_array()
            .map(|a| a.len() as u32)
            .unwrap_or(0);
        let grounding_cost_usd = self.grounding_cost_rate(&params).input_per_1k * grounding_queries as f64;

        Ok(GenerateResult {
            text,
            usage,
            model: self.model(&params).to_string(),
            request_json: Some(serde_json::to_vec(&body).unwrap_or_default()),
            response_json: Some(serde_json::to_vec(&value).unwrap_or_default()),
            grounding_queries,
            grounding_cost_usd,
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
        let body = self.build_body(&params);
        let action = "streamGenerateContent";
        let url = format!(
            "{}/models/{}:{}?alt=sse&key={}",
            self.base_url(&params),
            self.model(&params),
            action,
            params.config.api_key
        );

        let response = self
            .client
            .post(&url)
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
                if let Some(parts) = payload["candidates"][0]["content"]["parts"].as_array() {
                    for part in parts {
                        if let Some(text) = part["text"].as_str() {
                            if !text.is_empty() {
                                let _ = tx.send(StreamChunk::Text { text: text.to_string() }).await;
                            }
                        }
                    }
                }
                if let Some(meta) = payload.get("usageMetadata") {
                    usage = Usage::new(
                        meta["promptTokenCount"].as_u64().unwrap_or(0),
                        meta["candidatesTokenCount"].as_u64().unwrap_or(0),
                    );
                }
            }
        }
        let _ = tx.send(StreamChunk::Complete { model, usage }).await;
        Ok(())
    }
}
