//! Elasticsearch client wrapper.

use elasticsearch::{
    cluster::ClusterHealthParts,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    CountParts, Elasticsearch,
};
use serde_json::Value;
use std::io;
use tokio::net::lookup_host;
use tracing::{debug, info};

use super::backend::ensure_success;
use crate::config::EsConfig;
use crate::error::{EsError, Result};

/// Connection to one cluster through a single seed node.
///
/// Built once with [`EsClient::connect`] and cloned freely; clones share the
/// underlying transport.
#[derive(Clone)]
pub struct EsClient {
    client: Elasticsearch,
    cluster_name: String,
    address: String,
}

impl EsClient {
    /// Resolve the seed node, build the transport and verify the cluster name.
    ///
    /// Resolution failures, unreachable nodes and cluster name mismatches are
    /// all returned as errors; no half-initialized client is ever produced.
    pub async fn connect(config: &EsConfig) -> Result<Self> {
        config.validate()?;

        let address = format!("{}:{}", config.host, config.port);
        let resolved = lookup_host(address.as_str())
            .await
            .map_err(|source| EsError::HostResolution {
                host: config.host.clone(),
                source,
            })?
            .next()
            .is_some();
        if !resolved {
            return Err(EsError::HostResolution {
                host: config.host.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
            });
        }

        let url = config.url()?;
        let conn_pool = SingleNodeConnectionPool::new(url);
        let transport = TransportBuilder::new(conn_pool).disable_proxy().build()?;

        let client = Self {
            client: Elasticsearch::new(transport),
            cluster_name: config.cluster_name.clone(),
            address,
        };
        client.handshake().await?;

        info!(
            cluster = %client.cluster_name,
            address = %client.address,
            "Connected to Elasticsearch"
        );
        Ok(client)
    }

    /// Ask the node which cluster it belongs to.
    async fn handshake(&self) -> Result<()> {
        let response = ensure_success(self.client.info().send().await?).await?;
        let body = response.json::<Value>().await?;

        let actual = body["cluster_name"]
            .as_str()
            .ok_or_else(|| EsError::malformed("cluster info has no cluster_name"))?;
        debug!(cluster = actual, "Handshake completed");

        if actual != self.cluster_name {
            return Err(EsError::ClusterMismatch {
                expected: self.cluster_name.clone(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    /// Get the underlying Elasticsearch client
    pub fn client(&self) -> &Elasticsearch {
        &self.client
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Seed node as `host:port`.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Check if cluster is healthy
    pub async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await?;

        Ok(response.status_code().is_success())
    }

    /// Get document count in index
    pub async fn doc_count(&self, index: &str) -> Result<u64> {
        let response = self
            .client
            .count(CountParts::Index(&[index]))
            .send()
            .await?;

        let body = ensure_success(response).await?.json::<Value>().await?;
        Ok(body["count"].as_u64().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unresolvable_host_is_an_error() {
        let config = EsConfig::new("test", "no-such-host.invalid", 9200);
        let result = EsClient::connect(&config).await;
        assert!(matches!(result, Err(EsError::HostResolution { .. })));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_network() {
        let mut config = EsConfig::new("test", "localhost", 9200);
        config.max_hits = 0;
        assert!(matches!(
            EsClient::connect(&config).await,
            Err(EsError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_resolved_but_unreachable_node_fails_handshake() {
        // Nothing listens on port 1; resolution succeeds and the handshake fails.
        let config = EsConfig::new("test", "127.0.0.1", 1);
        let result = EsClient::connect(&config).await;
        assert!(matches!(result, Err(EsError::Transport(_))));
    }
}
