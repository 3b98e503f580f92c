use super::*;

#[test]
fn test_defaults_when_unset() {
    std::env::remove_var("VAAKA_TICK_INTERVAL_SECONDS");
    std::env::remove_var("VAAKA_PROMETHEUS_ADDRESS");
    std::env::remove_var("VAAKA_CALL_TIMEOUT_SECONDS");
    std::env::remove_var("VAAKA_HEALTH_PORT");
    std::env::remove_var("VAAKA_NAMESPACE");
    std::env::remove_var("VAAKA_LEADER_ELECTION");

    let config = Config::from_env();

    assert_eq!(config.tick_interval, DEFAULT_TICK_INTERVAL);
    assert_eq!(config.prometheus_address, DEFAULT_PROMETHEUS_ADDRESS);
    assert_eq!(config.call_timeout, DEFAULT_CALL_TIMEOUT);
    assert_eq!(config.health_port, DEFAULT_HEALTH_PORT);
    assert_eq!(config.controller_namespace, DEFAULT_CONTROLLER_NAMESPACE);
    assert!(!config.leader_election_enabled);
}

#[test]
fn test_tick_interval_overridden_from_env() {
    std::env::set_var("VAAKA_TICK_INTERVAL_SECONDS", "37");
    let config = Config::from_env();
    std::env::remove_var("VAAKA_TICK_INTERVAL_SECONDS");

    assert_eq!(config.tick_interval, Duration::from_secs(37));
}

#[test]
fn test_invalid_tick_interval_falls_back_to_default() {
    std::env::set_var("VAAKA_TICK_INTERVAL_SECONDS", "not-a-number");
    let config = Config::from_env();
    std::env::remove_var("VAAKA_TICK_INTERVAL_SECONDS");

    assert_eq!(config.tick_interval, DEFAULT_TICK_INTERVAL);
}

#[test]
fn test_prometheus_address_overridden_from_env() {
    std::env::set_var("VAAKA_PROMETHEUS_ADDRESS", "http://prometheus.monitoring:9090");
    let config = Config::from_env();
    std::env::remove_var("VAAKA_PROMETHEUS_ADDRESS");

    assert_eq!(config.prometheus_address, "http://prometheus.monitoring:9090");
}

#[test]
fn test_leader_election_enabled_by_true_or_one() {
    for value in ["true", "1"] {
        std::env::set_var("VAAKA_LEADER_ELECTION", value);
        let config = Config::from_env();
        assert!(config.leader_election_enabled, "value {value} should enable leader election");
    }
    std::env::remove_var("VAAKA_LEADER_ELECTION");
}

#[test]
fn test_leader_election_disabled_by_anything_else() {
    std::env::set_var("VAAKA_LEADER_ELECTION", "nope");
    let config = Config::from_env();
    std::env::remove_var("VAAKA_LEADER_ELECTION");

    assert!(!config.leader_election_enabled);
}

#[test]
fn test_health_port_overridden_from_env() {
    std::env::set_var("VAAKA_HEALTH_PORT", "9999");
    let config = Config::from_env();
    std::env::remove_var("VAAKA_HEALTH_PORT");

    assert_eq!(config.health_port, 9999);
}
