use kube::Client;
use std::sync::Arc;
use tracing::{error, info, warn};

use vaaka::clock::SystemClock;
use vaaka::config::Config;
use vaaka::engine::RolloutEngine;
use vaaka::events::KubeEventRecorder;
use vaaka::gateway::metrics::HttpMetricsGateway;
use vaaka::gateway::route::KubeRouteGateway;
use vaaka::gateway::store::KubeCanaryStore;
use vaaka::gateway::workload::KubeWorkloadGateway;
use vaaka::server::{
    create_metrics, run_health_server, run_leader_election, shutdown_channel, wait_for_signal,
    LeaderConfig, LeaderState, ReadinessState,
};
use vaaka::ticker::{Registry, Ticker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("starting canary rollout control core");

    let config = Config::from_env();

    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    let readiness = ReadinessState::new();
    let metrics = create_metrics().expect("failed to create metrics registry");
    let leader_state = LeaderState::new();

    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("connected to Kubernetes cluster");

    let health_readiness = readiness.clone();
    let health_metrics = metrics.clone();
    let health_port = config.health_port;
    let health_handle = tokio::spawn(async move {
        if let Err(e) = run_health_server(health_port, health_readiness, health_metrics).await {
            warn!(error = %e, "health server failed");
        }
    });
    info!(port = health_port, "health and metrics server task spawned");

    let leader_handle = if config.leader_election_enabled {
        let leader_client = client.clone();
        let leader_config = LeaderConfig::from_env();
        let leader_state_clone = leader_state.clone();
        let leader_shutdown = shutdown_signal.clone();

        info!(holder_id = %leader_config.holder_id, "leader election enabled");

        Some(tokio::spawn(async move {
            run_leader_election(leader_client, leader_config, leader_state_clone, leader_shutdown).await;
        }))
    } else {
        info!("leader election disabled - running as single instance");
        leader_state.set_leader(true);
        None
    };

    let engine = Arc::new(RolloutEngine::new(
        Arc::new(KubeWorkloadGateway::new(client.clone())),
        Arc::new(KubeRouteGateway::new(client.clone())),
        Arc::new(HttpMetricsGateway::new(config.prometheus_address.clone())),
        Arc::new(KubeCanaryStore::new(client.clone())),
        Arc::new(SystemClock),
        Arc::new(KubeEventRecorder::new(client.clone(), "vaaka-controller")),
        config.call_timeout,
    ));

    // Populating the registry from live Canary objects is the job of an external reconciler
    // (out of scope for this core); the Ticker only ever drives whatever keys land in it.
    let registry = Registry::new();

    let ticker = Ticker::new(
        engine,
        registry,
        config.tick_interval,
        leader_state.clone(),
        metrics.clone(),
    );

    readiness.set_ready();
    info!("controller ready, starting tick loop");

    tokio::select! {
        _ = ticker.run(shutdown_signal.clone()) => {
            info!("ticker stopped");
        }
        signal = wait_for_signal() => {
            info!(signal = signal, "initiating graceful shutdown");
            readiness.set_not_ready();
        }
    }

    shutdown_controller.shutdown();

    info!("stopping components...");
    if let Some(handle) = leader_handle {
        handle.abort();
    }
    health_handle.abort();

    info!("canary rollout control core shut down gracefully");
    Ok(())
}
