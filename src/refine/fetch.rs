//! Concurrent fetching of publisher requests.
//!
//! # Architecture
//!
//! - [`FetchAsync`]: Core trait for issuing a single request
//! - [`HttpFetcher`]: `reqwest` implementation sharing one connection pool
//! - [`fetch_all`]: Runs a whole wave of requests with bounded concurrency
//!
//! # Ordering
//!
//! Responses complete in any order, but [`fetch_all`] returns them in request
//! order. Downstream splitting and reattachment are purely positional, so this
//! is a hard requirement, not a convenience.

use crate::error::FetchError;
use crate::refine::request::RequestDescriptor;
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderName, HeaderValue};
use std::error::Error;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Trait for async retrieval of one request's raw body.
///
/// Implementors return the response body as text. Non-success HTTP statuses
/// are not errors here: publishers report rejections in the body, which the
/// extractors inspect.
pub trait FetchAsync {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<String, FetchError>;
}

/// HTTP fetcher backed by a single shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build the process-wide HTTP client.
    ///
    /// # Arguments
    ///
    /// * `proxy` - Optional proxy URL applied to every request
    /// * `verify_ssl` - When `false`, invalid certificates are accepted
    /// * `pool_size` - Idle connections kept per host
    pub fn new(proxy: Option<&str>, verify_ssl: bool, pool_size: usize) -> Result<Self, Box<dyn Error>> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(pool_size)
            .connect_timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(!verify_ssl);
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
            info!(%proxy, "Routing requests through proxy");
        }
        if !verify_ssl {
            warn!("TLS certificate verification is disabled");
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl FetchAsync for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(url = %request.url))]
    async fn fetch(&self, request: &RequestDescriptor) -> Result<String, FetchError> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchError::InvalidRequest(format!("header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FetchError::InvalidRequest(format!("header value for {name}: {e}")))?;
            builder = builder.header(name, value);
        }
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(%status, bytes = body.len(), "Fetched response");
        Ok(body)
    }
}

/// Fetch every request with at most `limit` in flight, preserving order.
///
/// A failed request does not affect its siblings: its slot holds the error
/// and the caller decides what to skip.
#[instrument(level = "info", skip_all, fields(requests = requests.len(), limit = limit))]
pub async fn fetch_all<F: FetchAsync>(
    fetcher: &F,
    requests: &[RequestDescriptor],
    limit: usize,
) -> Vec<Result<String, FetchError>> {
    let t0 = Instant::now();
    let bodies: Vec<Result<String, FetchError>> = stream::iter(requests)
        .map(|request| fetcher.fetch(request))
        .buffered(limit.max(1))
        .collect()
        .await;

    let failed = bodies.iter().filter(|b| b.is_err()).count();
    info!(
        total = bodies.len(),
        failed,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Fetched publisher responses"
    );
    bodies
}
