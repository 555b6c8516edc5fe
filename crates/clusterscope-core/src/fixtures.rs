//! Shared builders for unit tests.

use std::path::{Path, PathBuf};

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Event, Node, Pod};
use serde_json::json;

/// Port 1 on loopback refuses connections immediately.
pub const UNREACHABLE_SERVER: &str = "http://127.0.0.1:1";

pub fn kubeconfig_yaml(contexts: &[(&str, &str)]) -> String {
    let mut clusters = String::new();
    let mut ctxs = String::new();
    for (name, server) in contexts {
        clusters.push_str(&format!("- name: {name}-cluster\n  cluster:\n    server: {server}\n"));
        ctxs.push_str(&format!(
            "- name: {name}\n  context:\n    cluster: {name}-cluster\n    user: tester\n    namespace: team-{name}\n"
        ));
    }
    format!(
        "apiVersion: v1\nkind: Config\nclusters:\n{clusters}contexts:\n{ctxs}users:\n- name: tester\n  user:\n    token: test-token\n"
    )
}

pub fn write_kubeconfig(dir: &Path, file: &str, contexts: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, kubeconfig_yaml(contexts)).unwrap();
    path
}

pub fn pod(namespace: &str, name: &str, uid: &str) -> Pod {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": { "name": name, "namespace": namespace, "uid": uid },
        "spec": { "containers": [{ "name": "app", "image": "nginx:latest" }] },
        "status": { "phase": "Running" }
    }))
    .unwrap()
}

pub fn owned_pod(namespace: &str, name: &str, owner_kind: &str, owner_name: &str) -> Pod {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("uid-{name}"),
            "ownerReferences": [{
                "apiVersion": "apps/v1",
                "kind": owner_kind,
                "name": owner_name,
                "uid": format!("uid-{owner_name}"),
                "controller": true
            }]
        },
        "spec": { "containers": [] }
    }))
    .unwrap()
}

pub fn replica_set(namespace: &str, name: &str, deployment: Option<&str>) -> ReplicaSet {
    let owners = deployment
        .map(|d| {
            json!([{ "apiVersion": "apps/v1", "kind": "Deployment", "name": d, "uid": format!("uid-{d}"), "controller": true }])
        })
        .unwrap_or_else(|| json!([]));
    serde_json::from_value(json!({
        "apiVersion": "apps/v1",
        "kind": "ReplicaSet",
        "metadata": { "name": name, "namespace": namespace, "uid": format!("uid-{name}"), "ownerReferences": owners },
        "spec": { "selector": { "matchLabels": {} } }
    }))
    .unwrap()
}

pub fn job(namespace: &str, name: &str, cron_job: Option<&str>) -> Job {
    let owners = cron_job
        .map(|c| {
            json!([{ "apiVersion": "batch/v1", "kind": "CronJob", "name": c, "uid": format!("uid-{c}"), "controller": true }])
        })
        .unwrap_or_else(|| json!([]));
    serde_json::from_value(json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": { "name": name, "namespace": namespace, "uid": format!("uid-{name}"), "ownerReferences": owners },
        "spec": { "template": { "spec": { "containers": [] } } }
    }))
    .unwrap()
}

pub fn event(namespace: &str, name: &str) -> Event {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Event",
        "metadata": { "name": name, "namespace": namespace, "uid": format!("uid-{name}") },
        "involvedObject": { "kind": "Pod", "name": "web", "namespace": namespace },
        "reason": "Scheduled",
        "message": "assigned",
        "type": "Normal"
    }))
    .unwrap()
}

pub fn node(name: &str, cpu: &str, memory: &str) -> Node {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Node",
        "metadata": { "name": name, "uid": format!("uid-{name}") },
        "status": { "allocatable": { "cpu": cpu, "memory": memory } }
    }))
    .unwrap()
}
