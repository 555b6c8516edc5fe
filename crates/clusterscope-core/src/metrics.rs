pub mod aggregate;
pub mod collector;
pub mod quantity;
pub mod ring;
pub mod source;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use aggregate::{aggregate, NodeSample};
pub use collector::{Collector, ErrorThrottle};
pub use ring::RingBuffer;
pub use source::{KubeUsageSource, NodeCapacity, UsageSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Primary,
    Fallback,
    Unavailable,
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Unavailable => "unavailable",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUsage {
    pub name: String,
    pub cpu_pct: f64,
    pub mem_pct: f64,
}

/// One cluster-wide sample. Percentages are raw and may exceed 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPoint {
    /// Unix seconds.
    pub ts: i64,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub peak_cpu_pct: f64,
    pub peak_mem_pct: f64,
    pub top_nodes: Vec<NodeUsage>,
    pub source: SourceTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MetricPoint {
    pub fn unavailable(ts: i64, error: impl Into<String>) -> Self {
        Self {
            ts,
            cpu_pct: 0.0,
            mem_pct: 0.0,
            peak_cpu_pct: 0.0,
            peak_mem_pct: 0.0,
            top_nodes: Vec::new(),
            source: SourceTag::Unavailable,
            error: Some(error.into()),
        }
    }
}
