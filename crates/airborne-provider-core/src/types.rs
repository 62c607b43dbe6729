use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Parameters for a single `GenerateReply`/`GenerateReplyStream` call.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub config: ProviderConfig,
    pub instructions: String,
    pub user_input: String,
    pub conversation_history: Vec<Message>,
    pub override_model: Option<String>,
    pub request_id: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerateResult {
    pub text: String,
    pub usage: Usage,
    pub model: String,
    pub request_json: Option<Vec<u8>>,
    pub response_json: Option<Vec<u8>>,
    /// Gemini-only grounding accounting; zero for providers without grounding.
    pub grounding_queries: u32,
    pub grounding_cost_usd: f64,
}

#[derive(Debug, Clone)]
pub enum StreamChunk {
    Text { text: String },
    Citation {
        file_id: Option<String>,
        start: u32,
        end: u32,
        snippet: Option<String>,
    },
    Complete { model: String, usage: Usage },
    Error { cause: String, retryable: bool },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtraOptions(pub HashMap<String, String>);

impl ExtraOptions {
    pub fn merge_winning(&self, overrides: &ExtraOptions) -> ExtraOptions {
        let mut merged = self.0.clone();
        for (k, v) in &overrides.0 {
            merged.insert(k.clone(), v.clone());
        }
        ExtraOptions(merged)
    }
}
