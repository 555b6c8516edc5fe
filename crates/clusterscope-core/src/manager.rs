use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clusterscope_config::EngineConfig;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Event, Namespace, Node, Pod};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::cache::ClusterCaches;
use crate::client::ClusterClient;
use crate::discovery::{ContextDescriptor, KubeconfigSources, Provider};
use crate::error::{EngineError, Result};
use crate::health::{self, ClusterStatus, HealthState, HealthTracker, ProbeOutcome, Thresholds};
use crate::hub::{MetricsHub, Subscription};
use crate::informer;
use crate::metrics::{Collector, KubeUsageSource, MetricPoint};
use crate::workload::{self, WorkloadOwner};

/// Everything owned for one context during one generation.
pub(crate) struct ClusterRuntime {
    pub(crate) descriptor: ContextDescriptor,
    pub(crate) client: ClusterClient,
    pub(crate) reachable: bool,
    pub(crate) caches: Arc<ClusterCaches>,
    pub(crate) health: Arc<HealthTracker>,
    pub(crate) hub: Arc<MetricsHub>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl ClusterRuntime {
    fn start(&self, config: &EngineConfig) {
        let name = &self.descriptor.name;

        self.tasks.spawn(health::run_probe_loop(
            Arc::clone(&self.health),
            self.client.clone(),
            config.health.clone(),
            self.cancel.clone(),
        ));

        let source = KubeUsageSource::new(self.client.inner_client(), &config.metrics);
        let collector = Collector::new(name.clone(), source, Arc::clone(&self.hub), config.metrics.clone());
        self.tasks.spawn(collector.run(self.cancel.clone()));

        if !self.reachable {
            info!(context = %name, "Cluster unreachable, watches not started");
            return;
        }

        let client = self.client.inner_client();
        informer::spawn_watchers(name, &client, &self.caches, &self.health, &self.tasks, &self.cancel);
        self.tasks.spawn({
            let name = name.clone();
            let caches = Arc::clone(&self.caches);
            let limit = config.cache.prewarm_timeout();
            let cancel = self.cancel.clone();
            async move {
                informer::prewarm(&name, client, caches, limit, cancel).await;
            }
        });
    }

    async fn stop(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

#[derive(Default)]
struct Generation {
    order: Vec<String>,
    runtimes: HashMap<String, Arc<ClusterRuntime>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub retained: Vec<String>,
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub name: String,
    pub provider: Provider,
    pub server: Option<String>,
    pub reachable: bool,
    pub status: ClusterStatus,
    pub pods: usize,
    pub nodes: usize,
    pub latest: Option<MetricPoint>,
}

/// Owns every per-context runtime and serves reads over them.
///
/// Per-context failures never surface as errors from the read API: unknown
/// contexts read as empty, unreachable ones stay addressable with empty caches.
pub struct ClusterManager {
    config: EngineConfig,
    sources: KubeconfigSources,
    generation: RwLock<Arc<Generation>>,
    // hubs outlive generations so subscribers survive a refresh
    hubs: Mutex<HashMap<String, Arc<MetricsHub>>>,
    lifecycle: tokio::sync::Mutex<()>,
    closed: AtomicBool,
    root: CancellationToken,
}

impl ClusterManager {
    pub fn new(config: EngineConfig, sources: KubeconfigSources) -> Self {
        Self {
            config,
            sources,
            generation: RwLock::new(Arc::new(Generation::default())),
            hubs: Mutex::new(HashMap::new()),
            lifecycle: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
            root: CancellationToken::new(),
        }
    }

    /// Builds a manager and runs the first discovery.
    pub async fn load(config: EngineConfig, sources: KubeconfigSources) -> Result<(Self, RefreshReport)> {
        let manager = Self::new(config, sources);
        let report = manager.refresh().await?;
        Ok((manager, report))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Rediscovers contexts and swaps in a fresh generation. The previous
    /// generation's tasks have all exited before any new task starts.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Cancelled);
        }

        let descriptors = self.sources.discover();
        debug!(contexts = descriptors.len(), "Kubeconfig discovery finished");

        let mut report = RefreshReport::default();
        let built = futures::future::join_all(descriptors.into_iter().map(|d| self.build_runtime(d))).await;

        let mut next = Generation::default();
        for (name, result) in built {
            match result {
                Ok(runtime) => {
                    next.order.push(name.clone());
                    next.runtimes.insert(name, Arc::new(runtime));
                }
                Err(e) => {
                    warn!(context = %name, "Skipping context: {e}");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        let next = Arc::new(next);
        let previous = std::mem::replace(&mut *self.generation.write(), Arc::clone(&next));

        futures::future::join_all(previous.runtimes.values().map(|rt| rt.stop())).await;

        for name in &next.order {
            if previous.runtimes.contains_key(name) {
                report.retained.push(name.clone());
            } else {
                report.added.push(name.clone());
            }
        }
        report.removed = previous.order.iter().filter(|n| !next.runtimes.contains_key(*n)).cloned().collect();

        self.retire_hubs(&next);

        for name in &next.order {
            if let Some(runtime) = next.runtimes.get(name) {
                runtime.start(&self.config);
            }
        }

        info!(
            added = report.added.len(),
            removed = report.removed.len(),
            retained = report.retained.len(),
            failed = report.failed.len(),
            "Cluster refresh complete"
        );
        Ok(report)
    }

    /// Stops every task, closes every hub and drops every client. Idempotent.
    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.root.cancel();
        let previous = std::mem::take(&mut *self.generation.write());
        futures::future::join_all(previous.runtimes.values().map(|rt| rt.stop())).await;

        for (_, hub) in self.hubs.lock().drain() {
            hub.close();
        }
        info!("Cluster manager shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn build_runtime(&self, descriptor: ContextDescriptor) -> (String, Result<ClusterRuntime>) {
        let name = descriptor.name.clone();
        let client = match ClusterClient::build(&descriptor).await {
            Ok(client) => client,
            Err(e) => return (name, Err(e)),
        };

        let health = Arc::new(HealthTracker::new(Thresholds::from(&self.config.health)));
        let cancel = self.root.child_token();

        let probe = tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            result = client.probe_version(self.config.health.connect_timeout()) => result,
        };
        let reachable = match probe {
            Ok(info) => {
                debug!(context = %name, version = %info.git_version, "Cluster reachable");
                health.record(&ProbeOutcome::Success { auth_suspect: false });
                true
            }
            Err(e) => {
                debug!(context = %name, "Cluster unreachable: {e}");
                health.record(&ProbeOutcome::Failure(e.to_string()));
                false
            }
        };

        let runtime = ClusterRuntime {
            hub: self.hub_for(&name),
            caches: Arc::new(ClusterCaches::new(&self.config.cache)),
            descriptor,
            client,
            reachable,
            health,
            cancel,
            tasks: TaskTracker::new(),
        };
        (name, Ok(runtime))
    }

    fn hub_for(&self, name: &str) -> Arc<MetricsHub> {
        let mut hubs = self.hubs.lock();
        let hub = hubs
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MetricsHub::new(self.config.metrics.ring_size, &self.config.hub)));
        Arc::clone(hub)
    }

    fn retire_hubs(&self, current: &Generation) {
        let mut hubs = self.hubs.lock();
        let keep: HashSet<&String> = current.runtimes.keys().collect();
        hubs.retain(|name, hub| {
            let alive = keep.contains(name);
            if !alive {
                hub.close();
            }
            alive
        });
    }

    fn current(&self) -> Arc<Generation> {
        Arc::clone(&self.generation.read())
    }

    pub(crate) fn runtime(&self, context: &str) -> Option<Arc<ClusterRuntime>> {
        self.current().runtimes.get(context).cloned()
    }

    // ---- read API ----

    /// Discovery order.
    pub fn list_contexts(&self) -> Vec<ContextDescriptor> {
        let generation = self.current();
        generation.order.iter().filter_map(|n| generation.runtimes.get(n)).map(|rt| rt.descriptor.clone()).collect()
    }

    pub fn context_names(&self) -> Vec<String> {
        self.current().order.clone()
    }

    /// The client exists even when the cluster is unreachable.
    pub fn client(&self, context: &str) -> Result<ClusterClient> {
        self.runtime(context).map(|rt| rt.client.clone()).ok_or_else(|| EngineError::ContextNotFound(context.into()))
    }

    pub fn health(&self, context: &str) -> Option<HealthState> {
        self.runtime(context).map(|rt| rt.health.snapshot())
    }

    pub fn is_reachable(&self, context: &str) -> bool {
        self.runtime(context).is_some_and(|rt| rt.reachable)
    }

    pub fn cached_namespaces(&self, context: &str) -> Vec<Namespace> {
        self.runtime(context).map(|rt| rt.caches.namespaces.list_all()).unwrap_or_default()
    }

    pub fn cached_nodes(&self, context: &str) -> Vec<Node> {
        self.runtime(context).map(|rt| rt.caches.nodes.list_all()).unwrap_or_default()
    }

    /// Empty `namespaces` means all of them.
    pub fn cached_pods(&self, context: &str, namespaces: &[String]) -> Vec<Pod> {
        self.runtime(context).map(|rt| rt.caches.pods.list(namespaces)).unwrap_or_default()
    }

    pub fn cached_events(&self, context: &str, namespaces: &[String]) -> Vec<Event> {
        self.runtime(context).map(|rt| rt.caches.events.list(namespaces)).unwrap_or_default()
    }

    pub fn cached_deployments(&self, context: &str, namespaces: &[String]) -> Vec<Deployment> {
        self.runtime(context).map(|rt| rt.caches.deployments.list(namespaces)).unwrap_or_default()
    }

    pub fn workload_owner(&self, context: &str, namespace: &str, pod: &str) -> Option<WorkloadOwner> {
        let runtime = self.runtime(context)?;
        let pod = runtime.caches.pods.get(namespace, pod)?;
        workload::resolve_workload_owner(&pod, &runtime.caches)
    }

    pub fn metrics_snapshot(&self, context: &str) -> Vec<MetricPoint> {
        self.hubs.lock().get(context).map(|hub| hub.snapshot()).unwrap_or_default()
    }

    pub fn latest_metrics(&self, context: &str) -> Option<MetricPoint> {
        self.hubs.lock().get(context).and_then(|hub| hub.latest())
    }

    pub fn subscribe_metrics(&self, context: &str) -> Result<Subscription> {
        let hub = self.hubs.lock().get(context).cloned();
        hub.map(|hub| hub.subscribe()).ok_or_else(|| EngineError::ContextNotFound(context.into()))
    }

    pub fn summaries(&self) -> Vec<ClusterSummary> {
        let generation = self.current();
        generation
            .order
            .iter()
            .filter_map(|n| generation.runtimes.get(n))
            .map(|rt| ClusterSummary {
                name: rt.descriptor.name.clone(),
                provider: rt.descriptor.provider,
                server: rt.descriptor.server.clone(),
                reachable: rt.reachable,
                status: rt.health.status(),
                pods: rt.caches.pods.len(),
                nodes: rt.caches.nodes.len(),
                latest: rt.hub.latest(),
            })
            .collect()
    }
}
