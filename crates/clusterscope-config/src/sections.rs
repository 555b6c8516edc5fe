use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Kubeconfig files tracked outside the standard locations.
    #[serde(alias = "extra-kubeconfigs")]
    pub extra_kubeconfigs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    #[serde(alias = "failure-threshold")]
    pub failure_threshold: u32,
    #[serde(alias = "success-threshold")]
    pub success_threshold: u32,
    #[serde(alias = "probe-interval-ms")]
    pub probe_interval_ms: u64,
    #[serde(alias = "probe-timeout-ms")]
    pub probe_timeout_ms: u64,
    #[serde(alias = "healthz-timeout-ms")]
    pub healthz_timeout_ms: u64,
    #[serde(alias = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            probe_interval_ms: 5_000,
            probe_timeout_ms: 5_000,
            healthz_timeout_ms: 2_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl HealthConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn healthz_timeout(&self) -> Duration {
        Duration::from_millis(self.healthz_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(alias = "event-cap")]
    pub event_cap: usize,
    #[serde(alias = "prewarm-timeout-ms")]
    pub prewarm_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { event_cap: 1000, prewarm_timeout_ms: 30_000 }
    }
}

impl CacheConfig {
    pub fn prewarm_timeout(&self) -> Duration {
        Duration::from_millis(self.prewarm_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    #[serde(alias = "interval-ms")]
    pub interval_ms: u64,
    #[serde(alias = "ring-size")]
    pub ring_size: usize,
    #[serde(alias = "top-nodes")]
    pub top_nodes: usize,
    #[serde(alias = "node-fetch-timeout-ms")]
    pub node_fetch_timeout_ms: u64,
    /// Deadline for node and metrics-API list calls.
    #[serde(alias = "list-timeout-ms")]
    pub list_timeout_ms: u64,
    #[serde(alias = "fetch-parallelism")]
    pub fetch_parallelism: usize,
    #[serde(alias = "metrics-api-recheck-ms")]
    pub metrics_api_recheck_ms: u64,
    #[serde(alias = "min-sample-ratio")]
    pub min_sample_ratio: f64,
    #[serde(alias = "error-log-interval-ms")]
    pub error_log_interval_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            ring_size: 180,
            top_nodes: 5,
            node_fetch_timeout_ms: 3_000,
            list_timeout_ms: 5_000,
            fetch_parallelism: 5,
            metrics_api_recheck_ms: 60_000,
            min_sample_ratio: 0.5,
            error_log_interval_ms: 30_000,
        }
    }
}

impl MetricsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn node_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.node_fetch_timeout_ms)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.list_timeout_ms)
    }

    pub fn metrics_api_recheck(&self) -> Duration {
        Duration::from_millis(self.metrics_api_recheck_ms)
    }

    pub fn error_log_interval(&self) -> Duration {
        Duration::from_millis(self.error_log_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HubConfig {
    #[serde(alias = "queue-depth")]
    pub queue_depth: usize,
    #[serde(alias = "ping-interval-ms")]
    pub ping_interval_ms: u64,
    #[serde(alias = "pong-timeout-ms")]
    pub pong_timeout_ms: u64,
    #[serde(alias = "overflow-grace-ms")]
    pub overflow_grace_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { queue_depth: 256, ping_interval_ms: 30_000, pong_timeout_ms: 60_000, overflow_grace_ms: 60_000 }
    }
}

impl HubConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    pub fn overflow_grace(&self) -> Duration {
        Duration::from_millis(self.overflow_grace_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "127.0.0.1:8787".into() }
    }
}
