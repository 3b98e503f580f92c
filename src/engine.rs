//! RolloutEngine: the tick procedure that drives a single Canary forward.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::analyzer::{self, CheckOutcome};
use crate::clock::Clock;
use crate::crd::{Canary, CanaryState};
use crate::events::EventRecorder;
use crate::gateway::route::Destination;
use crate::gateway::{RouteError, RouteGateway, StoreError, WorkloadError};
use crate::gateway::{CanaryStore, MetricsGateway, Workload, WorkloadGateway};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("workload unhealthy: {0}")]
    Unhealthy(String),

    #[error("malformed: {0}")]
    Malformed(String),

    #[error("transient remote error: {0}")]
    TransientRemote(String),

    #[error("metric below threshold: {0}")]
    MetricBelowThreshold(String),
}

impl From<WorkloadError> for EngineError {
    fn from(e: WorkloadError) -> Self {
        match e {
            WorkloadError::NotFound => EngineError::NotFound("workload".to_string()),
            WorkloadError::TransientRemote(err) => EngineError::TransientRemote(err.to_string()),
        }
    }
}

impl From<RouteError> for EngineError {
    fn from(e: RouteError) -> Self {
        match e {
            RouteError::NotFound => EngineError::NotFound("route".to_string()),
            RouteError::Malformed => {
                EngineError::Malformed("route lacks required destinations".to_string())
            }
            RouteError::TransientRemote(err) => EngineError::TransientRemote(err.to_string()),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => EngineError::NotFound("canary".to_string()),
            StoreError::TransientRemote(err) => EngineError::TransientRemote(err.to_string()),
            StoreError::Serialization(err) => EngineError::TransientRemote(err.to_string()),
        }
    }
}

/// What a completed `advance` call did. Distinct from `EngineError`, which represents a tick
/// that stopped short of the advance/promote step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The Canary object does not exist; nothing to do.
    NoCanary,
    /// First observation of this Canary; status initialized, candidate not yet brought up.
    Initialized,
    /// `initialized`, candidate revision unchanged: no-op.
    NoOp,
    /// `promotion-finished`/`promotion-failed`, candidate revision unchanged: revision re-recorded.
    RevisionRefreshed,
    /// `initialized`, new candidate revision observed: candidate brought up, now `running`.
    BroughtUp,
    /// `promotion-finished`/`promotion-failed`, new candidate revision observed: back to `running`.
    NewRevisionAfterCompletion,
    /// Failure budget exhausted: rolled back to the primary, `promotion-failed`.
    RolledBack,
    /// A metric check failed; `failedChecks` incremented, no weight change this tick.
    MetricCheckFailed,
    /// Traffic shifted by one step; still short of `maxWeight`.
    WeightAdvanced { canary_weight: i32 },
    /// Candidate reached `maxWeight` this tick; primary template was overwritten.
    Promoted { canary_weight: i32 },
    /// Candidate had already reached `maxWeight`; route and candidate replicas finalized.
    Finalized,
}

enum GateDecision {
    NotRunning(TickOutcome),
    Running,
}

async fn with_timeout<T, E>(
    duration: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, EngineError>
where
    EngineError: From<E>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(EngineError::TransientRemote("gateway call timed out".to_string())),
    }
}

pub struct RolloutEngine {
    workloads: Arc<dyn WorkloadGateway>,
    routes: Arc<dyn RouteGateway>,
    metrics: Arc<dyn MetricsGateway>,
    store: Arc<dyn CanaryStore>,
    #[allow(dead_code)]
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventRecorder>,
    call_timeout: Duration,
}

impl RolloutEngine {
    pub fn new(
        workloads: Arc<dyn WorkloadGateway>,
        routes: Arc<dyn RouteGateway>,
        metrics: Arc<dyn MetricsGateway>,
        store: Arc<dyn CanaryStore>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventRecorder>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            workloads,
            routes,
            metrics,
            store,
            clock,
            events,
            call_timeout,
        }
    }

    /// Runs exactly one tick for the named Canary. Every early exit is either `Ok` (a completed,
    /// expected outcome) or `Err(EngineError)` (the tick stopped at a gate without advancing);
    /// neither ever propagates past this call — the caller (the Ticker) only logs and records it.
    pub async fn advance(&self, name: &str, namespace: &str) -> Result<TickOutcome, EngineError> {
        let mut canary = match self.store.get(name, namespace).await {
            Ok(c) => c,
            Err(StoreError::NotFound) => return Ok(TickOutcome::NoCanary),
            Err(e) => return Err(e.into()),
        };

        let target = canary.spec.target_ref.clone();
        let primary_name = format!("{target}-primary");
        let route_name = canary
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| name.to_string());

        let candidate = with_timeout(self.call_timeout, self.workloads.get(&target, namespace)).await?;
        let (reason, ready) = crate::gateway::workload::readiness(&candidate);
        if !ready {
            self.events
                .warning(&canary, &format!("candidate not ready: {reason}"))
                .await;
            return Err(EngineError::Unhealthy(format!("candidate: {reason}")));
        }

        let primary =
            with_timeout(self.call_timeout, self.workloads.get(&primary_name, namespace)).await?;
        let (preason, pready) = crate::gateway::workload::readiness(&primary);
        if !pready || !crate::gateway::workload::is_advanceable(&primary) {
            self.events
                .warning(&canary, &format!("primary not ready: {preason}"))
                .await;
            return Err(EngineError::Unhealthy(format!("primary: {preason}")));
        }

        let (mut primary_dest, mut canary_dest) = with_timeout(
            self.call_timeout,
            self.routes.get(namespace, &route_name, &primary_name, &target),
        )
        .await?;

        match self.status_gate(&mut canary, &candidate, &target, namespace).await? {
            GateDecision::NotRunning(outcome) => return Ok(outcome),
            GateDecision::Running => {}
        }

        let threshold = canary.spec.analysis.threshold;
        let failed_checks = canary
            .status
            .as_ref()
            .expect("GateDecision::Running implies status is Some")
            .failed_checks;
        if failed_checks >= threshold {
            self.rollback(&mut canary, namespace, &route_name, &primary_name, &target)
                .await?;
            return Ok(TickOutcome::RolledBack);
        }

        if canary_dest.weight > 0 {
            let revision = canary
                .status
                .as_ref()
                .and_then(|s| s.canary_revision.clone())
                .unwrap_or_default();
            let outcome = match tokio::time::timeout(
                self.call_timeout,
                analyzer::check(self.metrics.as_ref(), &canary.spec.analysis.metrics, &target, &revision),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => CheckOutcome::CheckError("metrics query timed out".to_string()),
            };

            match outcome {
                CheckOutcome::Pass => {}
                CheckOutcome::MetricFailed(reason) => {
                    let status = canary.status.as_mut().expect("running implies status");
                    status.failed_checks += 1;
                    self.store.save(&canary).await?;
                    self.events
                        .warning(&canary, &format!("metric check failed: {reason}"))
                        .await;
                    return Ok(TickOutcome::MetricCheckFailed);
                }
                CheckOutcome::CheckError(reason) => {
                    self.events
                        .error(&canary, &format!("metric check errored: {reason}"))
                        .await;
                    return Err(EngineError::TransientRemote(reason));
                }
            }
        } else {
            self.events.info(&canary, "starting traffic shift").await;
        }

        let analysis = canary.spec.analysis.clone();
        if canary_dest.weight < analysis.max_weight {
            let new_primary_weight = (primary_dest.weight - analysis.step_weight).max(0);
            let new_canary_weight = (canary_dest.weight + analysis.step_weight).min(analysis.max_weight);
            primary_dest.weight = new_primary_weight;
            canary_dest.weight = new_canary_weight;

            self.routes
                .set_weights(namespace, &route_name, primary_dest.clone(), canary_dest.clone())
                .await?;

            if new_canary_weight >= analysis.max_weight {
                self.workloads
                    .update(&primary_name, namespace, &candidate.pod_template)
                    .await?;
                self.store.save(&canary).await?;
                self.events
                    .info(&canary, "promoted candidate template to primary")
                    .await;
                return Ok(TickOutcome::Promoted {
                    canary_weight: new_canary_weight,
                });
            }

            self.store.save(&canary).await?;
            Ok(TickOutcome::WeightAdvanced {
                canary_weight: new_canary_weight,
            })
        } else {
            self.routes
                .set_weights(
                    namespace,
                    &route_name,
                    Destination {
                        host: primary_dest.host.clone(),
                        weight: 100,
                    },
                    Destination {
                        host: canary_dest.host.clone(),
                        weight: 0,
                    },
                )
                .await?;
            self.workloads.scale(&target, namespace, 0).await?;
            canary.status.as_mut().expect("running implies status").state =
                Some(CanaryState::PromotionFinished);
            self.store.save(&canary).await?;
            self.events.info(&canary, "promotion finished").await;
            Ok(TickOutcome::Finalized)
        }
    }

    async fn status_gate(
        &self,
        canary: &mut Canary,
        candidate: &Workload,
        target: &str,
        namespace: &str,
    ) -> Result<GateDecision, EngineError> {
        let state = canary.status.as_ref().and_then(|s| s.state);
        match state {
            None => {
                self.store
                    .set_revision(canary, &candidate.pod_template, CanaryState::Initialized)
                    .await?;
                self.events.info(canary, "initialized").await;
                Ok(GateDecision::NotRunning(TickOutcome::Initialized))
            }
            Some(CanaryState::Running) => Ok(GateDecision::Running),
            Some(completed @ (CanaryState::PromotionFinished | CanaryState::PromotionFailed)) => {
                if self.store.diff(canary, &candidate.pod_template)? {
                    self.bring_candidate_up(canary, candidate, target, namespace).await?;
                    Ok(GateDecision::NotRunning(TickOutcome::NewRevisionAfterCompletion))
                } else {
                    self.store
                        .set_revision(canary, &candidate.pod_template, completed)
                        .await?;
                    Ok(GateDecision::NotRunning(TickOutcome::RevisionRefreshed))
                }
            }
            Some(CanaryState::Initialized) => {
                if self.store.diff(canary, &candidate.pod_template)? {
                    self.bring_candidate_up(canary, candidate, target, namespace).await?;
                    Ok(GateDecision::NotRunning(TickOutcome::BroughtUp))
                } else {
                    Ok(GateDecision::NotRunning(TickOutcome::NoOp))
                }
            }
        }
    }

    /// Scales the candidate up to one replica, resets the failure budget, and transitions to
    /// `running` under the newly observed revision. Shared by the `initialized` and
    /// `promotion-{finished,failed}` gate arms (R2).
    async fn bring_candidate_up(
        &self,
        canary: &mut Canary,
        candidate: &Workload,
        target: &str,
        namespace: &str,
    ) -> Result<(), EngineError> {
        with_timeout(self.call_timeout, self.workloads.scale(target, namespace, 1)).await?;
        if let Some(status) = canary.status.as_mut() {
            status.failed_checks = 0;
        }
        self.store
            .set_revision(canary, &candidate.pod_template, CanaryState::Running)
            .await?;
        self.events
            .info(canary, "candidate revision changed, rollout running")
            .await;
        Ok(())
    }

    async fn rollback(
        &self,
        canary: &mut Canary,
        namespace: &str,
        route_name: &str,
        primary_host: &str,
        candidate_host: &str,
    ) -> Result<(), EngineError> {
        self.routes
            .set_weights(
                namespace,
                route_name,
                Destination {
                    host: primary_host.to_string(),
                    weight: 100,
                },
                Destination {
                    host: candidate_host.to_string(),
                    weight: 0,
                },
            )
            .await?;
        self.workloads.scale(candidate_host, namespace, 0).await?;
        canary.status.as_mut().expect("running implies status").state =
            Some(CanaryState::PromotionFailed);
        self.store.save(canary).await?;
        self.events
            .error(canary, "failure budget exhausted, rolled back to primary")
            .await;
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
