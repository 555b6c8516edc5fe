use std::sync::Arc;
use std::time::Duration;

use clusterscope_config::HealthConfig;
use jiff::Timestamp;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ClusterClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    #[default]
    Unknown,
    Connecting,
    Connected,
    /// Reserved for partial-failure signals; nothing transitions here yet.
    Degraded,
    Disconnected,
    AuthError,
}

impl ClusterStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Degraded => "DEGRADED",
            Self::Disconnected => "DISCONNECTED",
            Self::AuthError => "AUTH_ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Auth,
    Network,
    Other,
}

const AUTH_MARKERS: &[&str] = &["unauthorized", "forbidden", "401", "403", "exec plugin", "authentication", "credentials"];
const NETWORK_MARKERS: &[&str] =
    &["connection refused", "no such host", "timeout", "network", "tls", "certificate", "dial tcp"];

/// Case-insensitive substring classification of a probe error.
pub fn classify_error(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        FailureKind::Auth
    } else if NETWORK_MARKERS.iter().any(|m| lower.contains(m)) {
        FailureKind::Network
    } else {
        FailureKind::Other
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Discovery answered. `auth_suspect` is set when `/healthz` came back 401/403.
    Success { auth_suspect: bool },
    Failure(String),
}

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub failures: u32,
    pub successes: u32,
}

impl From<&HealthConfig> for Thresholds {
    fn from(config: &HealthConfig) -> Self {
        Self { failures: config.failure_threshold.max(1), successes: config.success_threshold.max(1) }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { failures: 3, successes: 2 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthState {
    pub status: ClusterStatus,
    pub last_checked: Option<Timestamp>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub auth_suspect: bool,
}

impl HealthState {
    /// Applies one probe outcome. At most one of the two counters is non-zero afterwards.
    pub fn apply(&mut self, outcome: &ProbeOutcome, thresholds: Thresholds, now: Timestamp) {
        self.last_checked = Some(now);

        match outcome {
            ProbeOutcome::Success { auth_suspect } => {
                self.consecutive_failures = 0;
                self.consecutive_successes = self.consecutive_successes.saturating_add(1);
                self.auth_suspect = *auth_suspect;
                self.last_error = None;

                if self.consecutive_successes >= thresholds.successes {
                    self.status = ClusterStatus::Connected;
                } else if self.status != ClusterStatus::Connected {
                    self.status = ClusterStatus::Connecting;
                }
            }
            ProbeOutcome::Failure(message) => {
                self.consecutive_successes = 0;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_error = Some(message.clone());

                self.status = if self.consecutive_failures >= thresholds.failures {
                    if self.auth_suspect || classify_error(message) == FailureKind::Auth {
                        ClusterStatus::AuthError
                    } else {
                        ClusterStatus::Disconnected
                    }
                } else {
                    ClusterStatus::Connecting
                };
            }
        }
    }
}

/// Per-context health state. Reads never wait on an in-flight probe.
pub struct HealthTracker {
    state: RwLock<HealthState>,
    probe_lock: tokio::sync::Mutex<()>,
    thresholds: Thresholds,
}

impl HealthTracker {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { state: RwLock::new(HealthState::default()), probe_lock: tokio::sync::Mutex::new(()), thresholds }
    }

    pub fn snapshot(&self) -> HealthState {
        self.state.read().clone()
    }

    pub fn status(&self) -> ClusterStatus {
        self.state.read().status
    }

    pub fn record(&self, outcome: &ProbeOutcome) -> HealthState {
        let mut state = self.state.write();
        state.apply(outcome, self.thresholds, Timestamp::now());
        state.clone()
    }

    /// Runs one probe unless another is already in flight, in which case `None` is returned.
    pub async fn probe(&self, client: &ClusterClient, config: &HealthConfig) -> Option<HealthState> {
        let _guard = self.probe_lock.try_lock().ok()?;
        let outcome = run_probe(client, config).await;
        Some(self.record(&outcome))
    }
}

async fn run_probe(client: &ClusterClient, config: &HealthConfig) -> ProbeOutcome {
    if let Err(e) = client.probe_version(config.probe_timeout()).await {
        return ProbeOutcome::Failure(e.to_string());
    }

    let auth_suspect = match client.probe_healthz(config.healthz_timeout()).await {
        Ok(status) => matches!(status.as_u16(), 401 | 403),
        Err(e) => {
            debug!(context = %client.context(), "Healthz probe failed: {e}");
            false
        }
    };

    ProbeOutcome::Success { auth_suspect }
}

/// Probes on a fixed cadence until cancelled; a slow probe skips ticks rather than queueing them.
pub async fn run_probe_loop(
    tracker: Arc<HealthTracker>,
    client: ClusterClient,
    config: HealthConfig,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.probe_interval().max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut previous = tracker.status();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let state = tokio::select! {
            _ = cancel.cancelled() => break,
            state = tracker.probe(&client, &config) => state,
        };

        if let Some(state) = state {
            if state.status != previous {
                match state.status {
                    ClusterStatus::Disconnected | ClusterStatus::AuthError => warn!(
                        context = %client.context(),
                        error = state.last_error.as_deref().unwrap_or_default(),
                        "Cluster health {} -> {}", previous.label(), state.status.label()
                    ),
                    _ => info!(context = %client.context(), "Cluster health {} -> {}", previous.label(), state.status.label()),
                }
                previous = state.status;
            }
        }
    }

    debug!(context = %client.context(), "Health probe loop stopped");
}

#[cfg(test)]
mod tests;
