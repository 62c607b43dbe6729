use std::collections::HashMap;

use airborne_provider_core::provider::ProviderConfig;
use airborne_provider_core::types::ExtraOptions;
use thiserror::Error;

use crate::config::TenantConfig;

/// Per-call overrides a client request may supply. There is deliberately no
/// `api_key` field here — the type itself makes the security invariant in
/// §4.9 unrepresentable to override, rather than just unenforced.
#[derive(Debug, Clone, Default)]
pub struct RequestOverrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub extra_options: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum ConfigBuildError {
    #[error("tenant has no configuration for provider {0}")]
    UnknownProvider(String),
    #[error("provider {0} is not enabled for this tenant")]
    ProviderDisabled(String),
}

/// Builds a `ProviderConfig` for one call: start from the tenant's entry for
/// `provider_name`, deep-copy `extra_options`, then layer `overrides` on top
/// of every field except the api key.
pub fn build_provider_config(
    tenant: &TenantConfig,
    provider_name: &str,
    overrides: &RequestOverrides,
) -> Result<ProviderConfig, ConfigBuildError> {
    let settings = tenant
        .providers
        .get(provider_name)
        .ok_or_else(|| ConfigBuildError::UnknownProvider(provider_name.to_string()))?;

    if !settings.enabled {
        return Err(ConfigBuildError::ProviderDisabled(provider_name.to_string()));
    }

    let base_extra = ExtraOptions(settings.extra_options.clone());
    let override_extra = ExtraOptions(overrides.extra_options.clone());

    Ok(ProviderConfig {
        name: provider_name.to_string(),
        api_key: settings.api_key.clone(),
        model: overrides.model.clone().unwrap_or_else(|| settings.model.clone()),
        base_url: overrides.base_url.clone().or_else(|| settings.base_url.clone()),
        temperature: overrides.temperature.or(settings.temperature),
        top_p: overrides.top_p.or(settings.top_p),
        max_output_tokens: overrides.max_output_tokens.or(settings.max_output_tokens),
        extra_options: base_extra.merge_winning(&override_extra),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant_with_openai(api_key: &str, model: &str) -> TenantConfig {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            crate::config::ProviderSettings {
                enabled: true,
                api_key: api_key.to_string(),
                model: model.to_string(),
                base_url: None,
                temperature: Some(0.7),
                top_p: None,
                max_output_tokens: None,
                extra_options: HashMap::new(),
            },
        );
        TenantConfig {
            tenant_id: "t1".to_string(),
            default_provider: Some("openai".to_string()),
            providers,
        }
    }

    #[test]
    fn request_cannot_override_api_key_even_indirectly() {
        let tenant = tenant_with_openai("sk-tenant", "m1");
        let overrides = RequestOverrides {
            model: Some("m2".to_string()),
            ..Default::default()
        };
        let built = build_provider_config(&tenant, "openai", &overrides).unwrap();
        assert_eq!(built.api_key, "sk-tenant");
        assert_eq!(built.model, "m2");
    }

    #[test]
    fn extra_options_merge_with_request_winning_on_collision() {
        let mut tenant = tenant_with_openai("sk-tenant", "m1");
        tenant
            .providers
            .get_mut("openai")
            .unwrap()
            .extra_options
            .insert("seed".to_string(), "tenant-seed".to_string());
        let mut overrides = RequestOverrides::default();
        overrides
            .extra_options
            .insert("seed".to_string(), "request-seed".to_string());
        overrides
            .extra_options
            .insert("top_logprobs".to_string(), "5".to_string());

        let built = build_provider_config(&tenant, "openai", &overrides).unwrap();
        assert_eq!(built.extra_options.0.get("seed").unwrap(), "request-seed");
        assert_eq!(built.extra_options.0.get("top_logprobs").unwrap(), "5");
    }

    #[test]
    fn building_twice_from_same_inputs_is_idempotent_with_independent_maps() {
        let tenant = tenant_with_openai("sk-tenant", "m1");
        let overrides = RequestOverrides::default();
        let a = build_provider_config(&tenant, "openai", &overrides).unwrap();
        let mut b = build_provider_config(&tenant, "openai", &overrides).unwrap();
        assert_eq!(a.api_key, b.api_key);
        assert_eq!(a.model, b.model);
        b.extra_options.0.insert("x".to_string(), "y".to_string());
        assert!(a.extra_options.0.get("x").is_none());
    }

    #[test]
    fn disabled_provider_is_rejected() {
        let mut tenant = tenant_with_openai("sk-tenant", "m1");
        tenant.providers.get_mut("openai").unwrap().enabled = false;
        assert!(build_provider_config(&tenant, "openai", &RequestOverrides::default()).is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let tenant = tenant_with_openai("sk-tenant", "m1");
        assert!(build_provider_config(&tenant, "anthropic", &RequestOverrides::default()).is_err());
    }
}
