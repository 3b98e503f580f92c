//! CanaryStore: loads/persists the Canary resource and fingerprints pod templates.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::api::{Api, Patch, PatchParams};
use thiserror::Error;

use crate::crd::{Canary, CanarySpec, CanaryState, CanaryStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("canary not found")]
    NotFound,

    #[error("kubernetes API error: {0}")]
    TransientRemote(#[from] kube::Error),

    #[error("failed to serialize pod template: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Canonical JSON + FNV-1a, the same technique the pod-template fingerprinting this is
/// grounded on uses for its replica-set hash.
pub fn fingerprint(template: &PodTemplateSpec) -> Result<String, StoreError> {
    let json = serde_json::to_string(template)?;

    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in json.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }

    Ok(format!("{hash:016x}")[..10].to_string())
}

#[async_trait]
pub trait CanaryStore: Send + Sync {
    async fn get(&self, name: &str, namespace: &str) -> Result<Canary, StoreError>;

    async fn save(&self, canary: &Canary) -> Result<(), StoreError>;

    /// True iff the candidate's current template no longer matches the last recorded revision.
    fn diff(&self, canary: &Canary, candidate_template: &PodTemplateSpec) -> Result<bool, StoreError> {
        let current = fingerprint(candidate_template)?;
        Ok(Some(current) != canary.status.as_ref().and_then(|s| s.canary_revision.clone()))
    }

    /// Resets status to the new state with a freshly computed revision, preserving `failedChecks`.
    async fn set_revision(
        &self,
        canary: &mut Canary,
        candidate_template: &PodTemplateSpec,
        new_state: CanaryState,
    ) -> Result<(), StoreError> {
        let failed_checks = canary.status.as_ref().map(|s| s.failed_checks).unwrap_or(0);
        let revision = fingerprint(candidate_template)?;
        canary.status = Some(CanaryStatus {
            state: Some(new_state),
            canary_revision: Some(revision),
            failed_checks,
        });
        self.save(canary).await
    }
}

pub struct KubeCanaryStore {
    client: kube::Client,
}

impl KubeCanaryStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Canary> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl CanaryStore for KubeCanaryStore {
    async fn get(&self, name: &str, namespace: &str) -> Result<Canary, StoreError> {
        match self.api(namespace).get(name).await {
            Ok(c) => Ok(c),
            Err(kube::Error::Api(err)) if err.code == 404 => Err(StoreError::NotFound),
            Err(e) => Err(StoreError::TransientRemote(e)),
        }
    }

    async fn save(&self, canary: &Canary) -> Result<(), StoreError> {
        let name = canary
            .metadata
            .name
            .as_deref()
            .ok_or(StoreError::NotFound)?;
        let namespace = canary.metadata.namespace.as_deref().unwrap_or_default();

        let current = self.get(name, namespace).await?;
        if current.status.as_ref().map(|s| s.canary_revision.clone())
            == canary.status.as_ref().map(|s| s.canary_revision.clone())
            && current.status.as_ref().and_then(|s| s.state)
                == canary.status.as_ref().and_then(|s| s.state)
            && current.status.as_ref().map(|s| s.failed_checks)
                == canary.status.as_ref().map(|s| s.failed_checks)
        {
            return Ok(());
        }

        let patch = serde_json::json!({ "status": canary.status });
        self.api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub struct MockCanaryStore {
    canaries: std::sync::Mutex<std::collections::HashMap<(String, String), Canary>>,
    save_calls: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockCanaryStore {
    pub fn new() -> Self {
        Self {
            canaries: std::sync::Mutex::new(std::collections::HashMap::new()),
            save_calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, namespace: &str, name: &str, spec: CanarySpec, status: Option<CanaryStatus>) {
        let mut canary = Canary::new(name, spec);
        canary.metadata.namespace = Some(namespace.to_string());
        canary.status = status;
        self.canaries
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()), canary);
    }

    pub fn save_calls(&self) -> Vec<String> {
        self.save_calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl CanaryStore for MockCanaryStore {
    async fn get(&self, name: &str, namespace: &str) -> Result<Canary, StoreError> {
        self.canaries
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn save(&self, canary: &Canary) -> Result<(), StoreError> {
        let name = canary.metadata.name.clone().ok_or(StoreError::NotFound)?;
        let namespace = canary.metadata.namespace.clone().unwrap_or_default();
        self.save_calls.lock().unwrap().push(name.clone());
        self.canaries
            .lock()
            .unwrap()
            .insert((namespace, name), canary.clone());
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
