use std::collections::HashSet;
use std::fmt;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use serde::Serialize;

use crate::cache::ClusterCaches;

const MAX_HOPS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    ReplicaSet,
    Job,
    CronJob,
}

impl WorkloadKind {
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "Deployment" => Some(Self::Deployment),
            "StatefulSet" => Some(Self::StatefulSet),
            "DaemonSet" => Some(Self::DaemonSet),
            "ReplicaSet" => Some(Self::ReplicaSet),
            "Job" => Some(Self::Job),
            "CronJob" => Some(Self::CronJob),
            _ => None,
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Deployment => "deployment",
            Self::StatefulSet => "statefulset",
            Self::DaemonSet => "daemonset",
            Self::ReplicaSet => "replicaset",
            Self::Job => "job",
            Self::CronJob => "cronjob",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerHop {
    pub kind: WorkloadKind,
    pub name: String,
}

/// Top-level controller of a pod plus the intermediate owners walked to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadOwner {
    pub kind: WorkloadKind,
    pub name: String,
    pub namespace: String,
    pub via: Vec<OwnerHop>,
}

impl WorkloadOwner {
    /// e.g. `Pod -> replicaset web-5d9c -> deployment web`
    pub fn chain_label(&self) -> String {
        let mut label = String::from("Pod");
        for hop in &self.via {
            label.push_str(&format!(" -> {} {}", hop.kind, hop.name));
        }
        label.push_str(&format!(" -> {} {}", self.kind, self.name));
        label
    }
}

/// Walks controller owner references using only cached ReplicaSets and Jobs.
///
/// ReplicaSets are followed to their Deployment and Jobs to their CronJob. A
/// ReplicaSet or Job with no such owner (or missing from the cache) is itself
/// the workload. Pods without a controller, or owned by kinds outside
/// [`WorkloadKind`], resolve to `None`.
pub fn resolve_workload_owner(pod: &Pod, caches: &ClusterCaches) -> Option<WorkloadOwner> {
    let namespace = pod.namespace().unwrap_or_default();
    let mut owner = controller_of(pod.owner_references())?;
    let mut via = Vec::new();
    let mut visited = HashSet::new();

    for _ in 0..MAX_HOPS {
        let kind = WorkloadKind::from_kind(&owner.kind)?;
        if !visited.insert((kind, owner.name.clone())) {
            return None;
        }

        let parent = match kind {
            WorkloadKind::ReplicaSet => caches
                .replica_sets
                .get(&namespace, &owner.name)
                .and_then(|rs| controller_of(rs.owner_references()))
                .filter(|p| p.kind == "Deployment"),
            WorkloadKind::Job => caches
                .jobs
                .get(&namespace, &owner.name)
                .and_then(|job| controller_of(job.owner_references()))
                .filter(|p| p.kind == "CronJob"),
            _ => None,
        };

        match parent {
            Some(parent) => {
                via.push(OwnerHop { kind, name: owner.name });
                owner = parent;
            }
            None => return Some(WorkloadOwner { kind, name: owner.name, namespace, via }),
        }
    }

    None
}

fn controller_of(refs: &[OwnerReference]) -> Option<OwnerReference> {
    refs.iter().find(|r| r.controller == Some(true)).cloned()
}
