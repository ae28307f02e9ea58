// Raffle View - reqwest transports
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{RaffleClientError, Result};
use crate::fetcher::RaffleFetcher;
use crate::indexer::IndexerTransport;
use crate::rpc::{parse_rpc_response, rpc_request_body, RpcTransport};

fn transport_error(e: reqwest::Error) -> RaffleClientError {
    RaffleClientError::Transport(e.to_string())
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RaffleClientError::Config(format!("cannot build HTTP client: {}", e)))
}

async fn post_json(client: &reqwest::Client, url: &str, body: &Value) -> Result<Value> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(transport_error)?;
    let status = response.status();
    if !status.is_success() {
        return Err(RaffleClientError::Transport(format!("{} answered {}", url, status)));
    }
    response.json::<Value>().await.map_err(transport_error)
}

/// Indexer endpoint over HTTP POST
pub struct HttpIndexer {
    client: reqwest::Client,
    url: String,
}

impl HttpIndexer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

impl IndexerTransport for HttpIndexer {
    async fn post(&self, body: Value) -> Result<Value> {
        post_json(&self.client, &self.url, &body).await
    }
}

/// JSON-RPC provider over HTTP
pub struct HttpRpc {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpRpc {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }
}

impl RpcTransport for HttpRpc {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, method, "rpc request");
        let body = rpc_request_body(id, method, params);
        let response = post_json(&self.client, &self.url, &body).await?;
        parse_rpc_response(response)
    }
}

/// Fetcher wired to the configured indexer and RPC endpoints
pub fn fetcher_from_config(config: &ClientConfig) -> Result<RaffleFetcher<HttpIndexer, HttpRpc>> {
    let indexer = HttpIndexer::new(config.indexer_url.clone(), config.indexer_timeout())?;
    let rpc = HttpRpc::new(config.rpc_url.clone(), config.rpc_timeout())?;
    RaffleFetcher::new(config, indexer, rpc)
}
