use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::TenantConfig;
use crate::secret::{resolve_secret, SecretError};

#[derive(Debug, Error)]
pub enum TenantStoreError {
    #[error("failed to read tenant directory {0}: {1}")]
    ReadDir(String, String),
    #[error("failed to read tenant file {0}: {1}")]
    ReadFile(String, String),
    #[error("failed to parse tenant file {0}: {1}")]
    Parse(String, String),
    #[error("secret resolution failed for tenant {0}: {1}")]
    Secret(String, #[source] SecretError),
    #[error("tenant {0} has no enabled provider with a resolved api key and model")]
    Unusable(String),
}

type Snapshot = HashMap<String, Arc<TenantConfig>>;

/// Loads and serves tenant configs from a directory of `{tenant_id}.toml`
/// files. Reads take the lock-free `ArcSwap::load` path; `reload` builds a
/// brand new snapshot and only swaps the pointer if every tenant in it
/// validates — a bad file never takes down tenants that were fine before.
pub struct TenantStore {
    dir: PathBuf,
    snapshot: ArcSwap<Snapshot>,
}

impl TenantStore {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, TenantStoreError> {
        let dir = dir.as_ref().to_path_buf();
        let snapshot = build_snapshot(&dir)?;
        Ok(Self {
            dir,
            snapshot: ArcSwap::new(Arc::new(snapshot)),
        })
    }

    pub fn get(&self, tenant_id: &str) -> Option<Arc<TenantConfig>> {
        self.snapshot.load().get(tenant_id).cloned()
    }

    pub fn is_single_tenant(&self) -> bool {
        self.snapshot.load().len() == 1
    }

    /// Returns the sole tenant when `is_single_tenant()` is true, for
    /// unauthenticated/default-provider call paths.
    pub fn sole_tenant(&self) -> Option<Arc<TenantConfig>> {
        let snap = self.snapshot.load();
        if snap.len() == 1 {
            snap.values().next().cloned()
        } else {
            None
        }
    }

    pub fn reload(&self) -> Result<(), TenantStoreError> {
        let fresh = build_snapshot(&self.dir)?;
        info!(tenants = fresh.len(), "reloaded tenant snapshot");
        self.snapshot.store(Arc::new(fresh));
        Ok(())
    }
}

fn build_snapshot(dir: &Path) -> Result<Snapshot, TenantStoreError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| TenantStoreError::ReadDir(dir.display().to_string(), e.to_string()))?;

    let mut snapshot = Snapshot::new();
    for entry in entries {
        let entry = entry.map_err(|e| TenantStoreError::ReadDir(dir.display().to_string(), e.to_string()))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let tenant = load_one(&path)?;
        snapshot.insert(tenant.tenant_id.clone(), Arc::new(tenant));
    }
    Ok(snapshot)
}

fn load_one(path: &Path) -> Result<TenantConfig, TenantStoreError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| TenantStoreError::ReadFile(path.display().to_string(), e.to_string()))?;
    let mut tenant: TenantConfig = toml::from_str(&raw)
        .map_err(|e| TenantStoreError::Parse(path.display().to_string(), e.to_string()))?;

    for settings in tenant.providers.values_mut() {
        settings.api_key = resolve_secret(&settings.api_key)
            .map_err(|e| TenantStoreError::Secret(tenant.tenant_id.clone(), e))?;
    }

    if !tenant.has_usable_provider() {
        warn!(tenant_id = %tenant.tenant_id, "tenant has no usable provider after secret resolution");
        return Err(TenantStoreError::Unusable(tenant.tenant_id));
    }

    Ok(tenant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tenant(dir: &Path, name: &str, body: &str) {
        let mut f = std::fs::File::create(dir.join(format!("{name}.toml"))).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn loads_valid_tenant_files() {
        let dir = tempfile::tempdir().unwrap();
        write_tenant(
            dir.path(),
            "acme",
            r#"
            tenant_id = "acme"

            [providers.openai]
            enabled = true
            api_key = "sk-acme"
            model = "gpt-4o"
            "#,
        );
        let store = TenantStore::load(dir.path()).unwrap();
        assert!(store.get("acme").is_some());
        assert!(store.is_single_tenant());
    }

    #[test]
    fn reload_keeps_old_snapshot_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_tenant(
            dir.path(),
            "acme",
            r#"
            tenant_id = "acme"

            [providers.openai]
            enabled = true
            api_key = "sk-acme"
            model = "gpt-4o"
            "#,
        );
        let store = TenantStore::load(dir.path()).unwrap();
        assert!(store.get("acme").is_some());

        write_tenant(dir.path(), "broken", "not valid toml {{{");
        let result = store.reload();
        assert!(result.is_err());
        // old snapshot is untouched
        assert!(store.get("acme").is_some());
    }

    #[test]
    fn tenant_with_no_usable_provider_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        write_tenant(
            dir.path(),
            "acme",
            r#"
            tenant_id = "acme"

            [providers.openai]
            enabled = false
            api_key = "sk-acme"
            model = "gpt-4o"
            "#,
        );
        assert!(TenantStore::load(dir.path()).is_err());
    }
}
