//! EventRecorder: the three severity levels the engine reports against a Canary.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta, Time};
use kube::api::{Api, PostParams};

use crate::crd::Canary;

#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn info(&self, canary: &Canary, message: &str);
    async fn warning(&self, canary: &Canary, message: &str);
    async fn error(&self, canary: &Canary, message: &str);
}

pub struct KubeEventRecorder {
    client: kube::Client,
    reporting_controller: String,
}

impl KubeEventRecorder {
    pub fn new(client: kube::Client, reporting_controller: impl Into<String>) -> Self {
        Self {
            client,
            reporting_controller: reporting_controller.into(),
        }
    }

    async fn emit(&self, canary: &Canary, reason: &str, event_type: &str, message: &str) {
        let namespace = canary.metadata.namespace.clone().unwrap_or_default();
        let now = Time(chrono::Utc::now());

        let event = Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}-", canary.metadata.name.clone().unwrap_or_default())),
                namespace: Some(namespace.clone()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                api_version: Some("vaaka.io/v1alpha1".to_string()),
                kind: Some("Canary".to_string()),
                name: canary.metadata.name.clone(),
                namespace: Some(namespace.clone()),
                uid: canary.metadata.uid.clone(),
                ..Default::default()
            },
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            type_: Some(event_type.to_string()),
            first_timestamp: Some(now.clone()),
            last_timestamp: Some(now.clone()),
            event_time: Some(MicroTime(chrono::Utc::now())),
            source: Some(EventSource {
                component: Some(self.reporting_controller.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let api: Api<Event> = Api::namespaced(self.client.clone(), &namespace);
        if let Err(e) = api.create(&PostParams::default(), &event).await {
            tracing::warn!(error = %e, "failed to record event");
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn info(&self, canary: &Canary, message: &str) {
        self.emit(canary, "RolloutProgress", "Normal", message).await;
    }

    async fn warning(&self, canary: &Canary, message: &str) {
        self.emit(canary, "RolloutStalled", "Warning", message).await;
    }

    async fn error(&self, canary: &Canary, message: &str) {
        self.emit(canary, "RolloutError", "Warning", message).await;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[cfg(test)]
#[derive(Default)]
pub struct MockEventRecorder {
    events: std::sync::Mutex<Vec<(Severity, String)>>,
}

#[cfg(test)]
impl MockEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Severity, String)> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl EventRecorder for MockEventRecorder {
    async fn info(&self, _canary: &Canary, message: &str) {
        self.events.lock().unwrap().push((Severity::Info, message.to_string()));
    }

    async fn warning(&self, _canary: &Canary, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((Severity::Warning, message.to_string()));
    }

    async fn error(&self, _canary: &Canary, message: &str) {
        self.events.lock().unwrap().push((Severity::Error, message.to_string()));
    }
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;
