//! Transport relay: one chunked connection to the upstream inference
//! service, piped through without buffering or transformation.

use std::fmt;
use std::pin::Pin;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::config::Config;
use crate::types::ChatRequest;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Response headers the serving layer must apply when passing the stream
/// on to a browser. `no-store` plus disabled intermediary buffering keeps
/// reverse proxies from coalescing chunks; coalescing would not reorder
/// events but it would destroy the incremental-rendering UX.
pub const STREAMING_RESPONSE_HEADERS: [(&str, &str); 3] = [
    ("Cache-Control", "no-store"),
    ("Connection", "keep-alive"),
    ("X-Accel-Buffering", "no"),
];

/// Non-success upstream status, kept downcastable so the pipeline can
/// attach the code to the message fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamStatusError(pub u16);

impl fmt::Display for UpstreamStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upstream returned HTTP {}", self.0)
    }
}

impl std::error::Error for UpstreamStatusError {}

#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    upstream_url: String,
    api_key: Option<String>,
}

impl RelayClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            upstream_url: config.upstream_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Open the upstream connection and hand back the raw byte stream.
    ///
    /// A non-success status fails here, before any event is emitted: the
    /// caller gets a single terminal error, never a partial stream.
    /// Dropping the returned stream aborts the connection, which is how
    /// cancellation stops forwarding.
    pub async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        debug!(url = %self.upstream_url, "opening upstream stream");

        let mut outbound = self
            .http
            .post(&self.upstream_url)
            .header("accept", "text/event-stream")
            .json(request);
        if let Some(api_key) = &self.api_key {
            outbound = outbound.header("authorization", format!("Bearer {api_key}"));
        }

        let response = outbound
            .send()
            .await
            .map_err(|error| map_transport_error(error, &self.upstream_url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::Error::new(UpstreamStatusError(status.as_u16()))
                .context(format!("request to '{}' rejected", self.upstream_url)));
        }
        debug!(status = status.as_u16(), "upstream stream open");

        let upstream_url = self.upstream_url.clone();
        let stream = response
            .bytes_stream()
            .map(move |item| item.map_err(|error| map_transport_error(error, &upstream_url)));
        Ok(Box::pin(stream))
    }
}

fn map_transport_error(error: reqwest::Error, upstream_url: &str) -> anyhow::Error {
    if error.is_connect() {
        return anyhow!("cannot reach upstream '{upstream_url}': {error}");
    }
    if error.is_timeout() {
        return anyhow!("upstream request to '{upstream_url}' timed out: {error}");
    }
    anyhow!("upstream request to '{upstream_url}' failed: {error}")
}
