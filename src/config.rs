//! Environment-variable-driven runtime configuration.
//!
//! Every setting has a documented default so the binary runs with zero required
//! configuration against a minimal cluster; env vars only need to be set to override.

use std::time::Duration;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_PROMETHEUS_ADDRESS: &str = "http://localhost:9090";
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_HEALTH_PORT: u16 = 8080;
const DEFAULT_CONTROLLER_NAMESPACE: &str = "vaaka-system";

/// Runtime configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// How often the Ticker drives every registered Canary forward.
    pub tick_interval: Duration,
    /// Base address of the Prometheus instance metric checks are queried against.
    pub prometheus_address: String,
    /// Deadline applied to each gateway call on the critical tick path.
    pub call_timeout: Duration,
    /// Port the health/readiness/metrics HTTP server listens on.
    pub health_port: u16,
    /// Namespace the controller itself (and its Lease, when leader election is enabled)
    /// runs in.
    pub controller_namespace: String,
    /// Whether leader election is enabled for this deployment.
    pub leader_election_enabled: bool,
}

impl Config {
    /// Build configuration from environment variables, falling back to documented defaults.
    ///
    /// - `VAAKA_TICK_INTERVAL_SECONDS` (default 10)
    /// - `VAAKA_PROMETHEUS_ADDRESS` (default `http://localhost:9090`)
    /// - `VAAKA_CALL_TIMEOUT_SECONDS` (default 10)
    /// - `VAAKA_HEALTH_PORT` (default 8080)
    /// - `VAAKA_NAMESPACE` (default `vaaka-system`)
    /// - `VAAKA_LEADER_ELECTION` (`true`/`1` enables; default disabled)
    pub fn from_env() -> Self {
        Self {
            tick_interval: env_duration_seconds("VAAKA_TICK_INTERVAL_SECONDS", DEFAULT_TICK_INTERVAL),
            prometheus_address: std::env::var("VAAKA_PROMETHEUS_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_PROMETHEUS_ADDRESS.to_string()),
            call_timeout: env_duration_seconds("VAAKA_CALL_TIMEOUT_SECONDS", DEFAULT_CALL_TIMEOUT),
            health_port: std::env::var("VAAKA_HEALTH_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HEALTH_PORT),
            controller_namespace: std::env::var("VAAKA_NAMESPACE")
                .unwrap_or_else(|_| DEFAULT_CONTROLLER_NAMESPACE.to_string()),
            leader_election_enabled: is_leader_election_enabled(),
        }
    }
}

fn env_duration_seconds(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn is_leader_election_enabled() -> bool {
    std::env::var("VAAKA_LEADER_ELECTION")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
