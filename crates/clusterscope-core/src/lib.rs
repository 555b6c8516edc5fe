pub mod cache;
pub mod client;
pub mod discovery;
pub mod error;
pub mod health;
pub mod hub;
pub mod informer;
pub mod manager;
pub mod metrics;
pub mod workload;

#[cfg(test)]
mod fixtures;

pub use cache::{ClusterCaches, ResourceStore};
pub use client::{ClusterClient, ConnectionParams};
pub use discovery::{ContextDescriptor, KubeconfigSources, Provider};
pub use error::EngineError;
pub use health::{ClusterStatus, HealthState, HealthTracker};
pub use hub::{HubMessage, MetricsHub, Subscription};
pub use manager::{ClusterManager, ClusterSummary, RefreshReport};
pub use metrics::{MetricPoint, NodeUsage, SourceTag};
pub use workload::{WorkloadKind, WorkloadOwner};
