use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clusterscope_config::MetricsConfig;
use futures::StreamExt;
use jiff::Timestamp;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::aggregate::{aggregate, NodeSample};
use super::source::{NodeCapacity, RawUsage, UsageSource};
use super::{MetricPoint, SourceTag};
use crate::hub::MetricsHub;

/// Lets an error through when its text changes or once per `interval`.
#[derive(Debug)]
pub struct ErrorThrottle {
    interval: Duration,
    last_message: Option<String>,
    last_logged: Option<Instant>,
}

impl ErrorThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_message: None, last_logged: None }
    }

    pub fn should_log(&mut self, message: &str, now: Instant) -> bool {
        let changed = self.last_message.as_deref() != Some(message);
        let due = self.last_logged.map_or(true, |at| now.duration_since(at) >= self.interval);
        if changed || due {
            self.last_message = Some(message.to_string());
            self.last_logged = Some(now);
            true
        } else {
            false
        }
    }

    /// Forgets the current error; true if there was one.
    pub fn reset(&mut self) -> bool {
        self.last_logged = None;
        self.last_message.take().is_some()
    }
}

/// Periodic sampler for one context.
pub struct Collector<S> {
    context: String,
    source: Arc<S>,
    hub: Arc<MetricsHub>,
    config: MetricsConfig,
    // cached metrics API availability and when it was checked
    metrics_api: Option<(bool, Instant)>,
    last_source: Option<SourceTag>,
    throttle: ErrorThrottle,
}

impl<S: UsageSource> Collector<S> {
    pub fn new(context: impl Into<String>, source: S, hub: Arc<MetricsHub>, config: MetricsConfig) -> Self {
        let throttle = ErrorThrottle::new(config.error_log_interval());
        Self {
            context: context.into(),
            source: Arc::new(source),
            hub,
            config,
            metrics_api: None,
            last_source: None,
            throttle,
        }
    }

    /// Samples once and returns the point without publishing it.
    pub async fn collect_once(&mut self) -> MetricPoint {
        let ts = Timestamp::now().as_second();

        let nodes = match self.source.nodes().await {
            Ok(nodes) => nodes,
            Err(e) => return MetricPoint::unavailable(ts, format!("listing nodes failed: {e}")),
        };

        let primary_error = if self.metrics_api_available().await {
            match self.source.primary_usage().await {
                Ok(usage) => match join_primary(&nodes, &usage) {
                    Some(samples) => return aggregate(&samples, self.config.top_nodes, ts, SourceTag::Primary),
                    None => "metrics API reported no usage for known nodes".to_string(),
                },
                Err(e) => {
                    self.metrics_api = Some((false, Instant::now()));
                    format!("metrics API failed: {e}")
                }
            }
        } else {
            "metrics API unavailable".to_string()
        };

        if nodes.is_empty() {
            return aggregate(&[], self.config.top_nodes, ts, SourceTag::Fallback);
        }

        let (samples, failed) = self.fetch_summaries(&nodes).await;
        let total = nodes.len();
        let ratio = samples.len() as f64 / total as f64;

        if samples.is_empty() || ratio < self.config.min_sample_ratio {
            return MetricPoint::unavailable(
                ts,
                format!("{primary_error}; {failed}/{total} nodes failed summary fetch"),
            );
        }

        let mut point = aggregate(&samples, self.config.top_nodes, ts, SourceTag::Fallback);
        if failed > 0 {
            point.error = Some(format!("{failed}/{total} nodes failed summary fetch"));
        }
        point
    }

    /// Samples, then publishes to the hub (status first when the source changed).
    pub async fn tick(&mut self) -> MetricPoint {
        let point = self.collect_once().await;

        if self.last_source != Some(point.source) {
            let message = match (&point.source, &point.error) {
                (SourceTag::Unavailable, Some(error)) => error.clone(),
                (source, _) => format!("collecting from {source} source"),
            };
            self.hub.publish_status(point.source, message);
            self.last_source = Some(point.source);
        }

        match (&point.source, &point.error) {
            (SourceTag::Unavailable, Some(error)) => {
                if self.throttle.should_log(error, Instant::now()) {
                    warn!(context = %self.context, "Metrics collection failed: {error}");
                }
            }
            _ => {
                if self.throttle.reset() {
                    info!(context = %self.context, source = %point.source, "Metrics collection recovered");
                }
            }
        }

        self.hub.publish(point.clone());
        point
    }

    /// Ticks every `interval` until cancelled. A collection that overruns makes
    /// the ticker skip, never queue, the missed ticks.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval().max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.tick() => {}
            }
        }

        debug!(context = %self.context, "Metrics collector stopped");
    }

    async fn metrics_api_available(&mut self) -> bool {
        let recheck = self.config.metrics_api_recheck();
        if let Some((available, checked)) = self.metrics_api {
            if checked.elapsed() < recheck {
                return available;
            }
        }

        let available = self.source.metrics_api_available().await;
        if self.metrics_api.map(|(was, _)| was) != Some(available) {
            debug!(context = %self.context, available, "Metrics API availability checked");
        }
        self.metrics_api = Some((available, Instant::now()));
        available
    }

    async fn fetch_summaries(&self, nodes: &[NodeCapacity]) -> (Vec<NodeSample>, usize) {
        let results: Vec<_> = futures::stream::iter(nodes.iter().cloned())
            .map(|node| {
                let source = Arc::clone(&self.source);
                async move {
                    let usage = source.node_summary(&node.name).await;
                    (node, usage)
                }
            })
            .buffer_unordered(self.config.fetch_parallelism.max(1))
            .collect()
            .await;

        let mut samples = Vec::with_capacity(results.len());
        let mut failed = 0;
        for (node, usage) in results {
            match usage {
                Ok(usage) => samples.push(sample(node, usage)),
                Err(e) => {
                    debug!(context = %self.context, node = %node.name, "Summary fetch failed: {e}");
                    failed += 1;
                }
            }
        }
        samples.sort_by(|a, b| a.name.cmp(&b.name));
        (samples, failed)
    }
}

fn sample(node: NodeCapacity, usage: RawUsage) -> NodeSample {
    NodeSample {
        name: node.name,
        cpu_cores: usage.cpu_cores,
        mem_bytes: usage.mem_bytes,
        cpu_alloc: node.cpu_alloc,
        mem_alloc: node.mem_alloc,
    }
}

/// Matches metrics-API usage to listed nodes by name. `None` when nodes exist but none matched.
fn join_primary(nodes: &[NodeCapacity], usage: &HashMap<String, RawUsage>) -> Option<Vec<NodeSample>> {
    let samples: Vec<NodeSample> =
        nodes.iter().filter_map(|n| usage.get(&n.name).map(|u| sample(n.clone(), *u))).collect();
    if samples.is_empty() && !nodes.is_empty() {
        None
    } else {
        Some(samples)
    }
}
