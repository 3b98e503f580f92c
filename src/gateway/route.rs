//! RouteGateway: reads/updates the two-destination weighted route object.
//!
//! Backed by the Gateway API `HTTPRoute` resource, accessed through `kube::core::DynamicObject`
//! rather than the `gateway-api` crate's typed bindings, so the controller does not require an
//! exact Gateway API CRD schema match at every cluster version skew — the same technique the
//! strategy-patching helper this is grounded on used for writes, extended here to reads too.

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::core::DynamicObject;
use kube::discovery::ApiResource;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route not found")]
    NotFound,

    #[error("route is malformed: neither managed destination is present")]
    Malformed,

    #[error("kubernetes API error: {0}")]
    TransientRemote(#[from] kube::Error),
}

/// One of the route's two managed destinations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub weight: i32,
}

fn httproute_api_resource() -> ApiResource {
    ApiResource {
        group: "gateway.networking.k8s.io".to_string(),
        version: "v1".to_string(),
        api_version: "gateway.networking.k8s.io/v1".to_string(),
        kind: "HTTPRoute".to_string(),
        plural: "httproutes".to_string(),
    }
}

/// Locate the primary/canary destinations among a route's rules' backendRefs.
///
/// Ambiguity (the same host appearing in multiple rules) is resolved by keeping the last match.
fn extract_destinations(
    rules: &[serde_json::Value],
    primary_host: &str,
    canary_host: &str,
) -> Result<(Destination, Destination), RouteError> {
    let mut primary: Option<Destination> = None;
    let mut canary: Option<Destination> = None;

    for rule in rules {
        let Some(refs) = rule.get("backendRefs").and_then(|v| v.as_array()) else {
            continue;
        };
        for backend_ref in refs {
            let Some(name) = backend_ref.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            let weight = backend_ref
                .get("weight")
                .and_then(|v| v.as_i64())
                .unwrap_or(0) as i32;
            if name == primary_host {
                primary = Some(Destination {
                    host: name.to_string(),
                    weight,
                });
            } else if name == canary_host {
                canary = Some(Destination {
                    host: name.to_string(),
                    weight,
                });
            }
        }
    }

    match (primary, canary) {
        (Some(p), Some(c)) => Ok((p, c)),
        _ => Err(RouteError::Malformed),
    }
}

#[async_trait]
pub trait RouteGateway: Send + Sync {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
        primary_host: &str,
        canary_host: &str,
    ) -> Result<(Destination, Destination), RouteError>;

    async fn set_weights(
        &self,
        namespace: &str,
        name: &str,
        primary: Destination,
        canary: Destination,
    ) -> Result<(), RouteError>;
}

pub struct KubeRouteGateway {
    client: kube::Client,
}

impl KubeRouteGateway {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &httproute_api_resource())
    }
}

#[async_trait]
impl RouteGateway for KubeRouteGateway {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
        primary_host: &str,
        canary_host: &str,
    ) -> Result<(Destination, Destination), RouteError> {
        let route = match self.api(namespace).get(name).await {
            Ok(r) => r,
            Err(kube::Error::Api(err)) if err.code == 404 => return Err(RouteError::NotFound),
            Err(e) => return Err(RouteError::TransientRemote(e)),
        };

        let rules = route
            .data
            .get("spec")
            .and_then(|s| s.get("rules"))
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        extract_destinations(&rules, primary_host, canary_host)
    }

    async fn set_weights(
        &self,
        namespace: &str,
        name: &str,
        primary: Destination,
        canary: Destination,
    ) -> Result<(), RouteError> {
        let patch = serde_json::json!({
            "spec": {
                "rules": [{
                    "backendRefs": [
                        {
                            "kind": "Service",
                            "group": "",
                            "name": primary.host,
                            "weight": primary.weight,
                        },
                        {
                            "kind": "Service",
                            "group": "",
                            "name": canary.host,
                            "weight": canary.weight,
                        },
                    ]
                }]
            }
        });

        match self
            .api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                warn!(route = %name, "route not found while setting weights");
                Err(RouteError::NotFound)
            }
            Err(e) => Err(RouteError::TransientRemote(e)),
        }
    }
}

#[cfg(test)]
pub struct MockRouteGateway {
    routes: std::sync::Mutex<
        std::collections::HashMap<(String, String), (Destination, Destination)>,
    >,
    malformed: std::sync::Mutex<std::collections::HashSet<(String, String)>>,
    set_weight_calls: std::sync::Mutex<Vec<(Destination, Destination)>>,
}

#[cfg(test)]
impl MockRouteGateway {
    pub fn new() -> Self {
        Self {
            routes: std::sync::Mutex::new(std::collections::HashMap::new()),
            malformed: std::sync::Mutex::new(std::collections::HashSet::new()),
            set_weight_calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, namespace: &str, name: &str, primary: Destination, canary: Destination) {
        self.routes
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()), (primary, canary));
    }

    pub fn mark_malformed(&self, namespace: &str, name: &str) {
        self.malformed
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()));
    }

    pub fn set_weight_calls(&self) -> Vec<(Destination, Destination)> {
        self.set_weight_calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl RouteGateway for MockRouteGateway {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
        _primary_host: &str,
        _canary_host: &str,
    ) -> Result<(Destination, Destination), RouteError> {
        let key = (namespace.to_string(), name.to_string());
        if self.malformed.lock().unwrap().contains(&key) {
            return Err(RouteError::Malformed);
        }
        self.routes
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(RouteError::NotFound)
    }

    async fn set_weights(
        &self,
        namespace: &str,
        name: &str,
        primary: Destination,
        canary: Destination,
    ) -> Result<(), RouteError> {
        self.set_weight_calls
            .lock()
            .unwrap()
            .push((primary.clone(), canary.clone()));
        self.routes.lock().unwrap().insert(
            (namespace.to_string(), name.to_string()),
            (primary, canary),
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "route_test.rs"]
mod tests;
