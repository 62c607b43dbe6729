use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// On-disk shape of a tenant's provider entry. `api_key` may still carry an
/// `ENV=`/`FILE=` prefix here; resolution happens once, when the tenant
/// snapshot is built, never per-call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub enabled: bool,
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub extra_options: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub tenant_id: String,
    #[serde(default)]
    pub default_provider: Option<String>,
    pub providers: HashMap<String, ProviderSettings>,
}

impl TenantConfig {
    /// A tenant is usable only if at least one provider entry is enabled with
    /// a resolved, non-empty api key and model.
    pub fn has_usable_provider(&self) -> bool {
        self.providers
            .values()
            .any(|p| p.enabled && !p.api_key.is_empty() && !p.model.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_requires_enabled_key_and_model() {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderSettings {
                enabled: true,
                api_key: "sk-x".to_string(),
                model: "gpt-4o".to_string(),
                base_url: None,
                temperature: None,
                top_p: None,
                max_output_tokens: None,
                extra_options: HashMap::new(),
            },
        );
        let tenant = TenantConfig {
            tenant_id: "t1".to_string(),
            default_provider: None,
            providers,
        };
        assert!(tenant.has_usable_provider());
    }

    #[test]
    fn unusable_when_disabled_or_missing_key() {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderSettings {
                enabled: false,
                api_key: "sk-x".to_string(),
                model: "gpt-4o".to_string(),
                base_url: None,
                temperature: None,
                top_p: None,
                max_output_tokens: None,
                extra_options: HashMap::new(),
            },
        );
        let tenant = TenantConfig {
            tenant_id: "t1".to_string(),
            default_provider: None,
            providers,
        };
        assert!(!tenant.has_usable_provider());
    }
}
