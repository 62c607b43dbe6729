use airborne_provider_core::types::{Message, Role};
use serde_json::{json, Value};

/// Builds a Chat-Completions-shaped `messages` array: system prompt first
/// (if non-empty), then history with non-assistant roles normalized to
/// `user` and empty-content entries dropped, then the trimmed user input as
/// the final `user` turn.
pub fn build_openai_messages(instructions: &str, history: &[Message], user_input: &str) -> Vec<Value> {
    let mut out = Vec::with_capacity(history.len() + 2);
    if !instructions.trim().is_empty() {
        out.push(json!({"role": "system", "content": instructions}));
    }
    for msg in history {
        if msg.content.trim().is_empty() {
            continue;
        }
        out.push(json!({"role": role_str(msg.role), "content": msg.content}));
    }
    let trimmed = user_input.trim();
    if !trimmed.is_empty() {
        out.push(json!({"role": "user", "content": trimmed}));
    }
    out
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::Assistant => "assistant",
        Role::User | Role::System => "user",
    }
}
