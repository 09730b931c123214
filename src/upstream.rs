//! Upstream Client
//!
//! HTTP fetcher factory for the marketplace API. Every query is a
//! `POST <endpoint>` carrying the filters as a JSON body.

use std::time::Duration;

use anyhow::{bail, Context};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tracing::debug;

/// Thin wrapper over a pooled `reqwest::Client` bound to one base URL.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build upstream HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Posts `body` to `endpoint` and parses the JSON response.
    ///
    /// Non-2xx statuses are errors carrying the response text.
    pub async fn post_json(&self, endpoint: &str, body: &Value) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("{} returned {}: {}", url, status, text);
        }

        response
            .json::<Value>()
            .await
            .with_context(|| format!("invalid JSON from {}", url))
    }

    /// Fetcher that re-issues the same request on every call.
    pub fn fetcher(
        &self,
        endpoint: impl Into<String>,
        body: Value,
    ) -> impl Fn() -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync + 'static {
        let client = self.clone();
        let endpoint = endpoint.into();
        move || {
            let client = client.clone();
            let endpoint = endpoint.clone();
            let body = body.clone();
            async move { client.post_json(&endpoint, &body).await }.boxed()
        }
    }
}
