mod store;

use clusterscope_config::CacheConfig;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Event, Namespace, Node, Pod};

pub use store::{ApplyOutcome, ObjectKey, Record, ResourceStore};

/// All per-kind stores for one context. Each store has its own lock.
pub struct ClusterCaches {
    pub pods: ResourceStore<Pod>,
    pub nodes: ResourceStore<Node>,
    pub events: ResourceStore<Event>,
    pub deployments: ResourceStore<Deployment>,
    pub replica_sets: ResourceStore<ReplicaSet>,
    pub jobs: ResourceStore<Job>,
    pub namespaces: ResourceStore<Namespace>,
}

impl ClusterCaches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            pods: ResourceStore::new(),
            nodes: ResourceStore::new(),
            events: ResourceStore::bounded(config.event_cap),
            deployments: ResourceStore::new(),
            replica_sets: ResourceStore::new(),
            jobs: ResourceStore::new(),
            namespaces: ResourceStore::new(),
        }
    }
}

impl Default for ClusterCaches {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
