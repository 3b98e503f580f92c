//! Leader election for multi-replica safety
//!
//! Uses a `coordination.k8s.io/v1::Lease` object to ensure only one controller
//! replica runs the Ticker at a time. Non-leader replicas stay alive (and
//! healthy/ready) but skip every tick period.

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::Lease;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default lease TTL (how long leadership is valid without renewal)
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(15);

/// Default renew interval (should be roughly 1/3 of the TTL)
pub const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Leader election configuration
#[derive(Clone)]
pub struct LeaderConfig {
    /// Unique identifier for this instance (usually the pod name)
    pub holder_id: String,
    /// Name of the Lease resource
    pub lease_name: String,
    /// Namespace for the Lease resource
    pub lease_namespace: String,
    /// How long leadership is valid, in seconds
    pub lease_duration_seconds: i32,
    /// How often to attempt a renew/acquire
    pub renew_interval: Duration,
}

impl LeaderConfig {
    /// Build config from environment variables.
    ///
    /// `POD_NAME` (falling back to `HOSTNAME`, then a generated id) supplies the holder
    /// identity; `POD_NAMESPACE` (default `vaaka-system`) supplies the Lease namespace.
    pub fn from_env() -> Self {
        let holder_id = std::env::var("POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| format!("vaaka-{}", uuid::Uuid::new_v4()));

        let lease_namespace =
            std::env::var("POD_NAMESPACE").unwrap_or_else(|_| "vaaka-system".to_string());

        Self {
            holder_id,
            lease_name: "vaaka-controller-leader".to_string(),
            lease_namespace,
            lease_duration_seconds: DEFAULT_LEASE_TTL.as_secs() as i32,
            renew_interval: DEFAULT_RENEW_INTERVAL,
        }
    }
}

/// Shared, cheaply cloned leadership flag consulted by the Ticker each period.
#[derive(Clone)]
pub struct LeaderState {
    is_leader: Arc<AtomicBool>,
}

impl LeaderState {
    pub fn new() -> Self {
        Self {
            is_leader: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// Used by the election loop, and by `main` directly when election is disabled.
    pub fn set_leader(&self, is_leader: bool) {
        self.is_leader.store(is_leader, Ordering::SeqCst);
    }
}

impl Default for LeaderState {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a lease renewed at `renew_time` with TTL `lease_duration` (seconds) is expired
/// as of `now`. Missing renew time or duration is treated as expired.
pub fn is_lease_expired(
    renew_time: Option<&MicroTime>,
    lease_duration: Option<i32>,
    now: DateTime<Utc>,
) -> bool {
    match (renew_time, lease_duration) {
        (Some(MicroTime(renew)), Some(duration)) => {
            let expiry = *renew + chrono::Duration::seconds(duration as i64);
            now > expiry
        }
        _ => true,
    }
}

async fn try_acquire_or_renew(api: &Api<Lease>, config: &LeaderConfig) -> Result<bool, kube::Error> {
    let now = Utc::now();
    let now_micro = MicroTime(now);

    match api.get(&config.lease_name).await {
        Ok(existing) => {
            let spec = existing.spec.as_ref();
            let current_holder = spec.and_then(|s| s.holder_identity.as_ref());
            let renew_time = spec.and_then(|s| s.renew_time.as_ref());
            let lease_duration = spec.and_then(|s| s.lease_duration_seconds);

            if current_holder == Some(&config.holder_id) {
                debug!(holder_id = %config.holder_id, "renewing lease");
                let patch = serde_json::json!({
                    "spec": {
                        "renewTime": now_micro,
                        "leaseDurationSeconds": config.lease_duration_seconds
                    }
                });
                api.patch(&config.lease_name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await?;
                return Ok(true);
            }

            if is_lease_expired(renew_time, lease_duration, now) {
                debug!(holder_id = %config.holder_id, "lease expired, attempting to acquire");
                let transitions = spec.and_then(|s| s.lease_transitions).unwrap_or(0);

                let patch = serde_json::json!({
                    "spec": {
                        "holderIdentity": config.holder_id,
                        "acquireTime": now_micro,
                        "renewTime": now_micro,
                        "leaseDurationSeconds": config.lease_duration_seconds,
                        "leaseTransitions": transitions + 1
                    }
                });

                api.patch(&config.lease_name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await?;
                return Ok(true);
            }

            debug!(
                holder_id = %config.holder_id,
                current_holder = ?current_holder,
                "lease held by another instance"
            );
            Ok(false)
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            info!(holder_id = %config.holder_id, "creating new lease");
            let lease = Lease {
                metadata: kube::api::ObjectMeta {
                    name: Some(config.lease_name.clone()),
                    namespace: Some(config.lease_namespace.clone()),
                    ..Default::default()
                },
                spec: Some(k8s_openapi::api::coordination::v1::LeaseSpec {
                    holder_identity: Some(config.holder_id.clone()),
                    acquire_time: Some(now_micro.clone()),
                    renew_time: Some(now_micro),
                    lease_duration_seconds: Some(config.lease_duration_seconds),
                    lease_transitions: Some(0),
                    ..Default::default()
                }),
            };

            match api.create(&PostParams::default(), &lease).await {
                Ok(_) => Ok(true),
                Err(kube::Error::Api(api_err)) if api_err.code == 409 => {
                    info!(
                        holder_id = %config.holder_id,
                        "lease already created by another holder; retrying next interval"
                    );
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

/// Runs the acquire/renew loop until `shutdown` fires, keeping `state` in sync.
///
/// On error the loop conservatively reports non-leader rather than leaving the last known
/// status in place — an API hiccup must not leave two replicas both believing they lead.
pub async fn run_leader_election(
    client: Client,
    config: LeaderConfig,
    state: LeaderState,
    mut shutdown: crate::server::ShutdownSignal,
) {
    let api: Api<Lease> = Api::namespaced(client, &config.lease_namespace);

    info!(
        holder_id = %config.holder_id,
        lease_name = %config.lease_name,
        lease_namespace = %config.lease_namespace,
        "starting leader election"
    );

    let mut renew_interval = tokio::time::interval(config.renew_interval);

    loop {
        tokio::select! {
            _ = renew_interval.tick() => {
                match try_acquire_or_renew(&api, &config).await {
                    Ok(is_leader) => {
                        let was_leader = state.is_leader();
                        state.set_leader(is_leader);

                        if is_leader && !was_leader {
                            info!(holder_id = %config.holder_id, "acquired leadership");
                        } else if !is_leader && was_leader {
                            warn!(holder_id = %config.holder_id, "lost leadership");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "leader election error");
                        if state.is_leader() {
                            warn!(holder_id = %config.holder_id, "lost leadership due to error");
                            state.set_leader(false);
                        }
                    }
                }
            }
            _ = shutdown.wait() => {
                info!("leader election shutting down");
                break;
            }
        }
    }
}
