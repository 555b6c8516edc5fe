use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Event, Namespace, Node, Pod};
use kube::api::ListParams;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::cache::{ClusterCaches, ResourceStore};
use crate::health::{ClusterStatus, HealthTracker};

type StoreOf<K> = fn(&ClusterCaches) -> &ResourceStore<K>;

/// Starts one watch per cached kind. Every task exits when `cancel` fires, or
/// on a watch error once `health` reports the cluster as lost; a refresh
/// starts them again.
pub fn spawn_watchers(
    context: &str,
    client: &Client,
    caches: &Arc<ClusterCaches>,
    health: &Arc<HealthTracker>,
    tracker: &TaskTracker,
    cancel: &CancellationToken,
) {
    let watch = WatchSet { context, client, caches, health, tracker, cancel };
    watch.spawn::<Pod>("pods", |c| &c.pods);
    watch.spawn::<Node>("nodes", |c| &c.nodes);
    watch.spawn::<Event>("events", |c| &c.events);
    watch.spawn::<Deployment>("deployments", |c| &c.deployments);
    watch.spawn::<ReplicaSet>("replicasets", |c| &c.replica_sets);
    watch.spawn::<Job>("jobs", |c| &c.jobs);
    watch.spawn::<Namespace>("namespaces", |c| &c.namespaces);
}

struct WatchSet<'a> {
    context: &'a str,
    client: &'a Client,
    caches: &'a Arc<ClusterCaches>,
    health: &'a Arc<HealthTracker>,
    tracker: &'a TaskTracker,
    cancel: &'a CancellationToken,
}

impl WatchSet<'_> {
    fn spawn<K>(&self, kind: &'static str, store: StoreOf<K>)
    where
        K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::all(self.client.clone());
        let caches = Arc::clone(self.caches);
        let health = Arc::clone(self.health);
        let cancel = self.cancel.clone();
        let context = self.context.to_string();

        self.tracker.spawn(async move {
            let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
            tokio::pin!(stream);
            let mut failing = false;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = stream.next() => match item {
                        Some(Ok(event)) => {
                            if failing {
                                info!(context = %context, kind, "Watch recovered");
                                failing = false;
                            }
                            store(&caches).apply_event(event);
                        }
                        Some(Err(e)) => {
                            if failing {
                                debug!(context = %context, kind, "Watch error: {e}");
                            } else {
                                warn!(context = %context, kind, "Watch error: {e}");
                                failing = true;
                            }
                            if matches!(health.status(), ClusterStatus::AuthError | ClusterStatus::Disconnected) {
                                info!(context = %context, kind, "Cluster lost, watch paused until next refresh");
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }

            debug!(context = %context, kind, "Watch stopped");
        });
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrewarmReport {
    pub namespaces: usize,
    pub nodes: usize,
    pub deployments: usize,
}

/// One-off bulk list of namespaces, nodes and per-namespace deployments, bounded by `limit`.
pub async fn prewarm(
    context: &str,
    client: Client,
    caches: Arc<ClusterCaches>,
    limit: Duration,
    cancel: CancellationToken,
) -> Option<PrewarmReport> {
    let result = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(context, "Pre-warm cancelled");
            return None;
        }
        result = tokio::time::timeout(limit, prewarm_inner(client, &caches)) => result,
    };

    match result {
        Ok(Ok(report)) => {
            info!(
                context,
                namespaces = report.namespaces,
                nodes = report.nodes,
                deployments = report.deployments,
                "Caches pre-warmed"
            );
            Some(report)
        }
        Ok(Err(e)) => {
            warn!(context, "Pre-warm failed: {e}");
            None
        }
        Err(_) => {
            warn!(context, "Pre-warm did not finish within {limit:?}");
            None
        }
    }
}

async fn prewarm_inner(client: Client, caches: &ClusterCaches) -> kube::Result<PrewarmReport> {
    let params = ListParams::default();
    let mut report = PrewarmReport::default();

    let namespaces = Api::<Namespace>::all(client.clone()).list(&params).await?;
    let names: Vec<String> = namespaces.items.iter().filter_map(|ns| ns.metadata.name.clone()).collect();
    report.namespaces = caches.namespaces.seed(namespaces.items);

    let nodes = Api::<Node>::all(client.clone()).list(&params).await?;
    report.nodes = caches.nodes.seed(nodes.items);

    let lists: Vec<_> = futures::stream::iter(names)
        .map(|ns| {
            let api: Api<Deployment> = Api::namespaced(client.clone(), &ns);
            let params = params.clone();
            async move { api.list(&params).await }
        })
        .buffer_unordered(5)
        .try_collect()
        .await?;

    for list in lists {
        report.deployments += caches.deployments.seed(list.items);
    }

    Ok(report)
}
