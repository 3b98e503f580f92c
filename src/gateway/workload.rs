//! WorkloadGateway: reads/updates workload objects, derives readiness, scales replicas.
//!
//! Backed by `k8s_openapi::api::apps::v1::Deployment` — its `status.conditions` carries the
//! `Progressing` condition type with a `reason` field, which is where `ProgressDeadlineExceeded`
//! is observed. ReplicaSet has no equivalent condition and is deliberately not used here.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::api::{Api, Patch, PatchParams};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("workload not found")]
    NotFound,

    #[error("kubernetes API error: {0}")]
    TransientRemote(#[from] kube::Error),
}

/// A workload's observed state, abstracted away from the concrete Deployment type.
#[derive(Clone, Debug)]
pub struct Workload {
    pub name: String,
    pub namespace: String,
    pub replicas: Option<i32>,
    pub generation: i64,
    pub observed_generation: Option<i64>,
    pub replicas_total: i32,
    pub updated_replicas: i32,
    pub available_replicas: i32,
    /// `reason` of the `Progressing` condition, if present.
    pub progressing_reason: Option<String>,
    pub pod_template: PodTemplateSpec,
}

impl TryFrom<Deployment> for Workload {
    type Error = WorkloadError;

    fn try_from(d: Deployment) -> Result<Self, Self::Error> {
        let name = d.metadata.name.ok_or(WorkloadError::NotFound)?;
        let namespace = d.metadata.namespace.unwrap_or_default();
        let generation = d.metadata.generation.unwrap_or(0);
        let status: DeploymentStatus = d.status.unwrap_or_default();
        let spec: DeploymentSpec = d.spec.unwrap_or_default();

        let progressing_reason = status
            .conditions
            .unwrap_or_default()
            .into_iter()
            .find(|c| c.type_ == "Progressing")
            .and_then(|c| c.reason);

        Ok(Workload {
            name,
            namespace,
            replicas: spec.replicas,
            generation,
            observed_generation: status.observed_generation,
            replicas_total: status.replicas.unwrap_or(0),
            updated_replicas: status.updated_replicas.unwrap_or(0),
            available_replicas: status.available_replicas.unwrap_or(0),
            progressing_reason,
            pod_template: spec.template,
        })
    }
}

/// Derive readiness deterministically from workload status, per the component design.
pub fn readiness(w: &Workload) -> (String, bool) {
    let observed = w.observed_generation.unwrap_or(-1);
    if observed < w.generation {
        return ("observed generation lags desired".to_string(), false);
    }
    if w.progressing_reason.as_deref() == Some("ProgressDeadlineExceeded") {
        return ("progress deadline exceeded".to_string(), false);
    }
    let desired = w.replicas.unwrap_or(0);
    if w.updated_replicas < desired {
        return (
            format!(
                "rollout in progress, {} of {} updated",
                w.updated_replicas, desired
            ),
            false,
        );
    }
    if w.replicas_total > w.updated_replicas {
        return ("old replicas pending termination".to_string(), false);
    }
    if w.available_replicas < w.updated_replicas {
        return ("waiting for availability".to_string(), false);
    }
    ("ready".to_string(), true)
}

/// A primary is "not advanceable" (distinct from unready) when it has no replicas at all.
pub fn is_advanceable(w: &Workload) -> bool {
    !matches!(w.replicas, None | Some(0))
}

#[async_trait]
pub trait WorkloadGateway: Send + Sync {
    async fn get(&self, name: &str, namespace: &str) -> Result<Workload, WorkloadError>;

    /// Overwrite the workload's pod template (used only during promotion).
    async fn update(&self, name: &str, namespace: &str, template: &PodTemplateSpec) -> Result<(), WorkloadError>;

    async fn scale(&self, name: &str, namespace: &str, replicas: i32) -> Result<(), WorkloadError>;
}

pub struct KubeWorkloadGateway {
    client: kube::Client,
}

impl KubeWorkloadGateway {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl WorkloadGateway for KubeWorkloadGateway {
    async fn get(&self, name: &str, namespace: &str) -> Result<Workload, WorkloadError> {
        match self.api(namespace).get(name).await {
            Ok(d) => Workload::try_from(d),
            Err(kube::Error::Api(err)) if err.code == 404 => Err(WorkloadError::NotFound),
            Err(e) => Err(WorkloadError::TransientRemote(e)),
        }
    }

    async fn update(
        &self,
        name: &str,
        namespace: &str,
        template: &PodTemplateSpec,
    ) -> Result<(), WorkloadError> {
        let patch = serde_json::json!({
            "spec": { "template": template }
        });
        match self
            .api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Err(WorkloadError::NotFound),
            Err(e) => Err(WorkloadError::TransientRemote(e)),
        }
    }

    async fn scale(&self, name: &str, namespace: &str, replicas: i32) -> Result<(), WorkloadError> {
        debug!(workload = %name, replicas, "scaling workload");
        let patch = serde_json::json!({
            "spec": { "replicas": replicas }
        });
        match self
            .api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Err(WorkloadError::NotFound),
            Err(e) => Err(WorkloadError::TransientRemote(e)),
        }
    }
}

#[cfg(test)]
pub struct MockWorkloadGateway {
    workloads: std::sync::Mutex<std::collections::HashMap<(String, String), Workload>>,
    scale_calls: std::sync::Mutex<Vec<(String, i32)>>,
    update_calls: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockWorkloadGateway {
    pub fn new() -> Self {
        Self {
            workloads: std::sync::Mutex::new(std::collections::HashMap::new()),
            scale_calls: std::sync::Mutex::new(Vec::new()),
            update_calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, w: Workload) {
        let key = (w.namespace.clone(), w.name.clone());
        self.workloads.lock().unwrap().insert(key, w);
    }

    pub fn scale_calls(&self) -> Vec<(String, i32)> {
        self.scale_calls.lock().unwrap().clone()
    }

    pub fn update_calls(&self) -> Vec<String> {
        self.update_calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl WorkloadGateway for MockWorkloadGateway {
    async fn get(&self, name: &str, namespace: &str) -> Result<Workload, WorkloadError> {
        self.workloads
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or(WorkloadError::NotFound)
    }

    async fn update(
        &self,
        name: &str,
        namespace: &str,
        template: &PodTemplateSpec,
    ) -> Result<(), WorkloadError> {
        self.update_calls.lock().unwrap().push(name.to_string());
        let mut workloads = self.workloads.lock().unwrap();
        let w = workloads
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or(WorkloadError::NotFound)?;
        w.pod_template = template.clone();
        Ok(())
    }

    async fn scale(&self, name: &str, namespace: &str, replicas: i32) -> Result<(), WorkloadError> {
        self.scale_calls
            .lock()
            .unwrap()
            .push((name.to_string(), replicas));
        let mut workloads = self.workloads.lock().unwrap();
        let w = workloads
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or(WorkloadError::NotFound)?;
        w.replicas = Some(replicas);
        Ok(())
    }
}

#[cfg(test)]
#[path = "workload_test.rs"]
mod tests;
