//! Network access abstraction for testability.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::error::{Error, Result};
use crate::request::{Request, Response, ResponseType};

/// Issues requests to the network on behalf of the manager.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    /// Performs `request` and returns the full response.
    ///
    /// HTTP error statuses are successful fetches; only transport failures
    /// are errors.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Builds a configured HTTP client for asset requests.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
}

/// Default fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: Url,
}

impl HttpFetcher {
    /// Creates a fetcher that classifies responses relative to `origin`.
    #[must_use]
    pub const fn new(client: reqwest::Client, origin: Url) -> Self {
        Self { client, origin }
    }

    /// Returns the origin responses are classified against.
    #[must_use]
    pub const fn origin(&self) -> &Url {
        &self.origin
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::Network(format!("invalid method {}: {e}", request.method)))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let final_url = response.url().clone();
        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let mut snapshot = Response::new(status, body)
            .with_url(&final_url)
            .with_redirected(strip_fragment(&final_url) != strip_fragment(&request.url));
        snapshot.headers = headers;
        snapshot.response_type = classify(&self.origin, &final_url, &snapshot);
        log::debug!(
            "{} {} -> {} ({:?})",
            request.method,
            request.url,
            status,
            snapshot.response_type
        );
        Ok(snapshot)
    }
}

/// Classifies a response the way a browser would for a page on `origin`.
#[must_use]
pub fn classify(origin: &Url, final_url: &Url, response: &Response) -> ResponseType {
    if origin.origin() == final_url.origin() {
        ResponseType::Basic
    } else if response.header("access-control-allow-origin").is_some() {
        ResponseType::Cors
    } else {
        ResponseType::Opaque
    }
}

fn strip_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

/// Headers that describe a single connection and must not be forwarded.
pub(crate) fn is_hop_by_hop(name: &str) -> bool {
    const HOP_BY_HOP: &[&str] = &[
        "connection",
        "keep-alive",
        "proxy-connection",
        "transfer-encoding",
        "upgrade",
        "te",
        "trailer",
        "host",
        "content-length",
    ];
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}
