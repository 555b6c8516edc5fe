use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),
    #[error("context {0} not found")]
    ContextNotFound(String),
    #[error("client construction failed: {0}")]
    Client(String),
    #[error(transparent)]
    Kube(#[from] kube::Error),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("operation cancelled")]
    Cancelled,
    #[error("metrics unavailable: {0}")]
    MetricsUnavailable(String),
    #[error("http error: {0}")]
    Http(#[from] http::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
