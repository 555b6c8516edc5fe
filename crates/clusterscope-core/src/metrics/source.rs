use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::ListParams;
use kube::{Api, Client};
use clusterscope_config::MetricsConfig;
use serde::Deserialize;

use super::quantity;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct NodeCapacity {
    pub name: String,
    pub cpu_alloc: f64,
    pub mem_alloc: f64,
}

impl From<&Node> for NodeCapacity {
    fn from(node: &Node) -> Self {
        let allocatable = node.status.as_ref().and_then(|s| s.allocatable.as_ref());
        let read = |key: &str, parse: fn(&Quantity) -> f64| allocatable.and_then(|a| a.get(key)).map(parse).unwrap_or(0.0);

        Self {
            name: node.metadata.name.clone().unwrap_or_default(),
            cpu_alloc: read("cpu", quantity::cpu_cores),
            mem_alloc: read("memory", quantity::bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawUsage {
    pub cpu_cores: f64,
    pub mem_bytes: f64,
}

/// What the collector needs from a cluster. Implemented over the API server
/// by [`KubeUsageSource`]; tests substitute scripted sources.
pub trait UsageSource: Send + Sync + 'static {
    fn nodes(&self) -> impl Future<Output = Result<Vec<NodeCapacity>>> + Send;

    fn metrics_api_available(&self) -> impl Future<Output = bool> + Send;

    /// Node usage from the metrics API, keyed by node name.
    fn primary_usage(&self) -> impl Future<Output = Result<HashMap<String, RawUsage>>> + Send;

    /// Node usage from the kubelet summary proxied through the API server.
    fn node_summary(&self, node: &str) -> impl Future<Output = Result<RawUsage>> + Send;
}

// metrics.k8s.io has no typed binding in k8s-openapi
#[derive(Debug, Clone, Deserialize)]
pub struct NodeMetrics {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub window: Option<String>,
    pub usage: NodeMetricsUsage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeMetricsUsage {
    pub cpu: Quantity,
    pub memory: Quantity,
}

impl k8s_openapi::Resource for NodeMetrics {
    const API_VERSION: &'static str = "metrics.k8s.io/v1beta1";
    const GROUP: &'static str = "metrics.k8s.io";
    const KIND: &'static str = "NodeMetrics";
    const VERSION: &'static str = "v1beta1";
    const URL_PATH_SEGMENT: &'static str = "nodes";
    type Scope = k8s_openapi::ClusterResourceScope;
}

impl k8s_openapi::Metadata for NodeMetrics {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}

/// `/api/v1/nodes/{name}/proxy/stats/summary`, only the fields we read.
#[derive(Debug, Deserialize)]
pub struct Summary {
    pub node: SummaryNode,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryNode {
    #[serde(default)]
    pub cpu: Option<SummaryCpu>,
    #[serde(default)]
    pub memory: Option<SummaryMemory>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryCpu {
    #[serde(default)]
    pub usage_nano_cores: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryMemory {
    #[serde(default)]
    pub working_set_bytes: Option<u64>,
    #[serde(default)]
    pub usage_bytes: Option<u64>,
}

impl Summary {
    /// Working set is preferred; total usage stands in when it is zero or absent.
    pub fn usage(&self) -> RawUsage {
        let nano_cores = self.node.cpu.as_ref().and_then(|c| c.usage_nano_cores).unwrap_or(0);
        let memory = self.node.memory.as_ref();
        let working_set = memory.and_then(|m| m.working_set_bytes).unwrap_or(0);
        let mem_bytes =
            if working_set > 0 { working_set } else { memory.and_then(|m| m.usage_bytes).unwrap_or(0) };

        RawUsage { cpu_cores: nano_cores as f64 / 1e9, mem_bytes: mem_bytes as f64 }
    }
}

#[derive(Clone)]
pub struct KubeUsageSource {
    client: Client,
    list_timeout: Duration,
    node_timeout: Duration,
}

impl KubeUsageSource {
    pub fn new(client: Client, config: &MetricsConfig) -> Self {
        Self { client, list_timeout: config.list_timeout(), node_timeout: config.node_fetch_timeout() }
    }
}

async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = kube::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(EngineError::Timeout(limit)),
    }
}

impl UsageSource for KubeUsageSource {
    async fn nodes(&self) -> Result<Vec<NodeCapacity>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = bounded(self.list_timeout, api.list(&ListParams::default())).await?;
        Ok(list.items.iter().map(NodeCapacity::from).collect())
    }

    async fn metrics_api_available(&self) -> bool {
        let api: Api<NodeMetrics> = Api::all(self.client.clone());
        bounded(self.list_timeout, api.list(&ListParams::default().limit(1))).await.is_ok()
    }

    async fn primary_usage(&self) -> Result<HashMap<String, RawUsage>> {
        let api: Api<NodeMetrics> = Api::all(self.client.clone());
        let list = bounded(self.list_timeout, api.list(&ListParams::default())).await?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|m| {
                let usage =
                    RawUsage { cpu_cores: quantity::cpu_cores(&m.usage.cpu), mem_bytes: quantity::bytes(&m.usage.memory) };
                m.metadata.name.map(|name| (name, usage))
            })
            .collect())
    }

    async fn node_summary(&self, node: &str) -> Result<RawUsage> {
        let request = http::Request::get(format!("/api/v1/nodes/{node}/proxy/stats/summary")).body(Vec::new())?;
        let summary: Summary = bounded(self.node_timeout, self.client.request(request)).await?;
        Ok(summary.usage())
    }
}

#[cfg(test)]
mod tests {
    use kube::config::Kubeconfig;

    use super::*;
    use crate::client::ClusterClient;
    use crate::fixtures::kubeconfig_yaml;

    #[test]
    fn summary_prefers_working_set() {
        let summary: Summary = serde_json::from_value(serde_json::json!({
            "node": {
                "nodeName": "worker-1",
                "cpu": { "usageNanoCores": 1_500_000_000u64 },
                "memory": { "workingSetBytes": 2048, "usageBytes": 4096 }
            }
        }))
        .unwrap();
        assert_eq!(summary.usage(), RawUsage { cpu_cores: 1.5, mem_bytes: 2048.0 });
    }

    #[test]
    fn summary_falls_back_to_usage_bytes() {
        let summary: Summary = serde_json::from_value(serde_json::json!({
            "node": { "cpu": {}, "memory": { "workingSetBytes": 0, "usageBytes": 4096 } }
        }))
        .unwrap();
        assert_eq!(summary.usage(), RawUsage { cpu_cores: 0.0, mem_bytes: 4096.0 });
    }

    #[test]
    fn node_capacity_reads_allocatable() {
        let node = crate::fixtures::node("worker-1", "3800m", "16Gi");
        let capacity = NodeCapacity::from(&node);
        assert_eq!(capacity.name, "worker-1");
        assert!((capacity.cpu_alloc - 3.8).abs() < 1e-9);
        assert_eq!(capacity.mem_alloc, 16.0 * 1024.0 * 1024.0 * 1024.0);
    }

    #[tokio::test]
    async fn list_calls_use_configured_deadline() {
        // accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                open.push(stream);
            }
        });

        let kubeconfig = Kubeconfig::from_yaml(&kubeconfig_yaml(&[("silent", server.as_str())])).unwrap();
        let client = ClusterClient::from_kubeconfig(kubeconfig, "silent").await.unwrap();
        let config = MetricsConfig { list_timeout_ms: 100, ..MetricsConfig::default() };
        let source = KubeUsageSource::new(client.inner_client(), &config);

        let started = std::time::Instant::now();
        let err = source.nodes().await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(limit) if limit == Duration::from_millis(100)));
        assert!(!source.metrics_api_available().await);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn node_metrics_deserialises() {
        let metrics: NodeMetrics = serde_json::from_value(serde_json::json!({
            "metadata": { "name": "worker-1" },
            "timestamp": "2024-05-01T10:00:00Z",
            "window": "20.03s",
            "usage": { "cpu": "250m", "memory": "1Gi" }
        }))
        .unwrap();
        assert_eq!(metrics.usage.cpu.0, "250m");
    }
}
