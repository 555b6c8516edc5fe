use std::time::Duration;

use super::*;

#[test]
fn default_config_matches_engine_defaults() {
    let config = EngineConfig::default();
    assert_eq!(config.metrics.interval(), Duration::from_secs(5));
    assert_eq!(config.metrics.ring_size, 180);
    assert_eq!(config.metrics.top_nodes, 5);
    assert_eq!(config.metrics.node_fetch_timeout(), Duration::from_secs(3));
    assert_eq!(config.metrics.fetch_parallelism, 5);
    assert_eq!(config.health.failure_threshold, 3);
    assert_eq!(config.health.success_threshold, 2);
    assert_eq!(config.health.probe_timeout(), Duration::from_secs(5));
    assert_eq!(config.health.healthz_timeout(), Duration::from_secs(2));
    assert_eq!(config.cache.event_cap, 1000);
    assert_eq!(config.cache.prewarm_timeout(), Duration::from_secs(30));
    assert_eq!(config.hub.queue_depth, 256);
    assert_eq!(config.hub.ping_interval(), Duration::from_secs(30));
    assert_eq!(config.hub.pong_timeout(), Duration::from_secs(60));
    assert_eq!(config.metrics.list_timeout(), Duration::from_secs(5));
}

#[test]
fn embedded_defaults_agree_with_struct_defaults() {
    let embedded: EngineConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
    assert_eq!(embedded.metrics.interval_ms, MetricsConfig::default().interval_ms);
    assert_eq!(embedded.metrics.min_sample_ratio, MetricsConfig::default().min_sample_ratio);
    assert_eq!(embedded.metrics.list_timeout_ms, MetricsConfig::default().list_timeout_ms);
    assert_eq!(embedded.health.connect_timeout_ms, HealthConfig::default().connect_timeout_ms);
    assert_eq!(embedded.hub.overflow_grace_ms, HubConfig::default().overflow_grace_ms);
    assert_eq!(embedded.server.bind, ServerConfig::default().bind);
    assert!(embedded.discovery.extra_kubeconfigs.is_empty());
}

#[test]
fn parse_partial_section_keeps_field_defaults() {
    let raw = r#"
[metrics]
interval_ms = 1000
"#;
    let config: EngineConfig = toml::from_str(raw).unwrap();
    assert_eq!(config.metrics.interval_ms, 1000);
    assert_eq!(config.metrics.ring_size, 180);
    assert_eq!(config.hub.queue_depth, 256);
}

#[test]
fn kebab_case_aliases_are_accepted() {
    let raw = r#"
[hub]
queue-depth = 4
overflow-grace-ms = 100

[cache]
event-cap = 10
"#;
    let config: EngineConfig = toml::from_str(raw).unwrap();
    assert_eq!(config.hub.queue_depth, 4);
    assert_eq!(config.hub.overflow_grace(), Duration::from_millis(100));
    assert_eq!(config.cache.event_cap, 10);
}

#[test]
fn merge_overrides_sections_and_appends_kubeconfigs() {
    let mut base: EngineConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
    base.discovery.extra_kubeconfigs.push("~/work/a.yaml".into());

    let user: EngineConfig = toml::from_str(
        r#"
[discovery]
extra_kubeconfigs = ["/etc/clusters/b.yaml"]

[health]
failure_threshold = 5
"#,
    )
    .unwrap();
    base.merge(user);

    assert_eq!(base.health.failure_threshold, 5);
    assert_eq!(base.health.success_threshold, 2);
    assert_eq!(base.discovery.extra_kubeconfigs, vec!["~/work/a.yaml".to_string(), "/etc/clusters/b.yaml".to_string()]);
}

#[test]
fn empty_user_config_keeps_defaults() {
    let mut base: EngineConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
    let user: EngineConfig = toml::from_str("").unwrap();
    base.merge(user);
    assert_eq!(base.metrics.top_nodes, 5);
    assert_eq!(base.server.bind, "127.0.0.1:8787");
}

#[test]
fn save_and_load_round_trip_through_disk() {
    let dir = std::env::temp_dir().join(format!("clusterscope-config-{}", std::process::id()));
    let path = dir.join("config.toml");
    let mut config = EngineConfig::default();
    config.metrics.top_nodes = 9;
    config.save(&path).unwrap();

    let loaded = EngineConfig::load_from(&path).unwrap();
    assert_eq!(loaded.metrics.top_nodes, 9);
    let _ = std::fs::remove_dir_all(&dir);
}
