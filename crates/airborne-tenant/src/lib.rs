pub mod builder;
pub mod config;
pub mod secret;
pub mod store;

pub use builder::{build_provider_config, RequestOverrides};
pub use config::{ProviderSettings, TenantConfig};
pub use secret::{resolve_secret, SecretError};
pub use store::{TenantStore, TenantStoreError};
