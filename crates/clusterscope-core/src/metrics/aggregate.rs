use std::cmp::Ordering;

use super::{MetricPoint, NodeUsage, SourceTag};

/// Usage and allocatable capacity observed for one node during a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSample {
    pub name: String,
    pub cpu_cores: f64,
    pub mem_bytes: f64,
    pub cpu_alloc: f64,
    pub mem_alloc: f64,
}

impl NodeSample {
    pub fn cpu_pct(&self) -> f64 {
        percent(self.cpu_cores, self.cpu_alloc)
    }

    pub fn mem_pct(&self) -> f64 {
        percent(self.mem_bytes, self.mem_alloc)
    }
}

fn percent(used: f64, total: f64) -> f64 {
    if total > 0.0 {
        used / total * 100.0
    } else {
        0.0
    }
}

/// Folds per-node samples into a cluster point.
///
/// Cluster percentages divide summed usage by summed allocatable over the
/// sampled nodes only. An empty sample set gives an all-zero point.
pub fn aggregate(samples: &[NodeSample], top_n: usize, ts: i64, source: SourceTag) -> MetricPoint {
    let (cpu_used, cpu_alloc, mem_used, mem_alloc) = samples.iter().fold((0.0, 0.0, 0.0, 0.0), |acc, s| {
        (acc.0 + s.cpu_cores, acc.1 + s.cpu_alloc, acc.2 + s.mem_bytes, acc.3 + s.mem_alloc)
    });

    let mut nodes: Vec<NodeUsage> =
        samples.iter().map(|s| NodeUsage { name: s.name.clone(), cpu_pct: s.cpu_pct(), mem_pct: s.mem_pct() }).collect();

    let peak_cpu_pct = nodes.iter().map(|n| n.cpu_pct).fold(0.0, f64::max);
    let peak_mem_pct = nodes.iter().map(|n| n.mem_pct).fold(0.0, f64::max);

    nodes.sort_by(|a, b| b.cpu_pct.partial_cmp(&a.cpu_pct).unwrap_or(Ordering::Equal).then_with(|| a.name.cmp(&b.name)));
    nodes.truncate(top_n);

    MetricPoint {
        ts,
        cpu_pct: percent(cpu_used, cpu_alloc),
        mem_pct: percent(mem_used, mem_alloc),
        peak_cpu_pct,
        peak_mem_pct,
        top_nodes: nodes,
        source,
        error: None,
    }
}
