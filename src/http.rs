//! HTTP client seam used for definition and tile fetches.

use crate::{EngineConfig, Error, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::time::Duration;

/// Status and body of a completed fetch
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests with a caller-supplied header map.
///
/// The returned future is `'static` so each fetch can be spawned as an
/// independent task.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str, headers: &BTreeMap<String, String>) -> BoxFuture<'static, Result<HttpResponse>>;
}

/// `reqwest`-backed client
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, headers: &BTreeMap<String, String>) -> BoxFuture<'static, Result<HttpResponse>> {
        let mut req = self.client.get(url);
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }
        Box::pin(async move {
            let resp = req.send().await?;
            let status = resp.status().as_u16();
            let body = resp.bytes().await?;
            Ok(HttpResponse { status, body })
        })
    }
}
