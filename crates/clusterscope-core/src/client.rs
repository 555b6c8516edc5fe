use std::time::Duration;

use k8s_openapi::apimachinery::pkg::version::Info;
use kube::client::Body;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::Serialize;

use crate::discovery::ContextDescriptor;
use crate::error::{EngineError, Result};

/// Connection parameters resolved from the kubeconfig for one context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionParams {
    pub cluster_url: String,
    pub default_namespace: String,
    pub accept_invalid_certs: bool,
    pub proxy_url: Option<String>,
}

impl From<&Config> for ConnectionParams {
    fn from(config: &Config) -> Self {
        Self {
            cluster_url: config.cluster_url.to_string(),
            default_namespace: config.default_namespace.clone(),
            accept_invalid_certs: config.accept_invalid_certs,
            proxy_url: config.proxy_url.as_ref().map(ToString::to_string),
        }
    }
}

/// API client bound to a single kubeconfig context.
///
/// Building one never talks to the cluster, so an unreachable context still
/// yields a usable handle. Reachability is checked separately with
/// [`ClusterClient::probe_version`].
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
    context: String,
    params: ConnectionParams,
}

impl ClusterClient {
    pub async fn build(descriptor: &ContextDescriptor) -> Result<Self> {
        let kubeconfig = Kubeconfig::read_from(&descriptor.source)?;
        Self::from_kubeconfig(kubeconfig, &descriptor.name).await
    }

    pub async fn from_kubeconfig(kubeconfig: Kubeconfig, context: &str) -> Result<Self> {
        let opts = KubeConfigOptions { context: Some(context.to_string()), ..Default::default() };
        let config = Config::from_custom_kubeconfig(kubeconfig, &opts).await?;
        let params = ConnectionParams::from(&config);
        let client = Client::try_from(config).map_err(|e| EngineError::Client(e.to_string()))?;

        Ok(Self { client, context: context.to_string(), params })
    }

    /// Version discovery bounded by `deadline`.
    pub async fn probe_version(&self, deadline: Duration) -> Result<Info> {
        match tokio::time::timeout(deadline, self.client.apiserver_version()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EngineError::Timeout(deadline)),
        }
    }

    /// Raw `GET /healthz`; the status code is returned as-is, errors are transport failures only.
    pub async fn probe_healthz(&self, deadline: Duration) -> Result<http::StatusCode> {
        let request = http::Request::get("/healthz").body(Body::from(Vec::new()))?;
        match tokio::time::timeout(deadline, self.client.send(request)).await {
            Ok(response) => Ok(response?.status()),
            Err(_) => Err(EngineError::Timeout(deadline)),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn namespace(&self) -> &str {
        &self.params.default_namespace
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn inner_client(&self) -> Client {
        self.client.clone()
    }
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient").field("context", &self.context).field("params", &self.params).finish()
    }
}
