use crate::feed::parser::{parse_document, FeedDocument};
use crate::shutdown::Shutdown;
use futures::StreamExt;
use reqwest::header::USER_AGENT;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_USER_AGENT: &str = "gator";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching and decoding one feed document.
///
/// The fetcher never retries; the scheduler's rotation decides when the feed
/// is tried again.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be built (empty or malformed URL)
    #[error("Invalid request: {0}")]
    RequestConstruction(String),
    /// Transport-level failure (DNS, connection, TLS)
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),
    /// Request plus body read exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// The shutdown signal fired while the fetch was in flight
    #[error("Fetch cancelled by shutdown")]
    Cancelled,
    /// The connection failed while streaming the body
    #[error("Failed to read response body: {0}")]
    BodyRead(#[source] reqwest::Error),
    /// Body exceeded the size limit
    #[error("Response too large (limit {0} bytes)")]
    ResponseTooLarge(usize),
    /// Body is not a decodable RSS document
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Retrieves and decodes feed documents.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    user_agent: String,
    timeout: Duration,
    max_bytes: usize,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(
            reqwest::Client::new(),
            DEFAULT_USER_AGENT,
            DEFAULT_TIMEOUT,
            DEFAULT_MAX_FEED_SIZE,
        )
    }
}

impl Fetcher {
    pub fn new(
        client: reqwest::Client,
        user_agent: &str,
        timeout: Duration,
        max_bytes: usize,
    ) -> Self {
        Self {
            client,
            user_agent: user_agent.to_string(),
            timeout,
            max_bytes,
        }
    }

    /// Fetch `url` with a single GET and decode the body as RSS.
    ///
    /// The response status and content type are not inspected; a body that
    /// does not decode fails as [`FetchError::Decode`].
    ///
    /// # Errors
    ///
    /// - [`FetchError::RequestConstruction`] - empty or unparseable URL
    /// - [`FetchError::Network`] - connection failure
    /// - [`FetchError::Timeout`] - exceeded the configured timeout
    /// - [`FetchError::Cancelled`] - `shutdown` fired mid-flight
    /// - [`FetchError::BodyRead`] / [`FetchError::ResponseTooLarge`] - body problems
    /// - [`FetchError::Decode`] - malformed markup
    pub async fn fetch(&self, url: &str, shutdown: &Shutdown) -> Result<FeedDocument, FetchError> {
        if url.trim().is_empty() {
            return Err(FetchError::RequestConstruction("empty URL".to_string()));
        }

        let request = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .build()
            .map_err(|e| FetchError::RequestConstruction(e.to_string()))?;

        let bytes = tokio::select! {
            biased;
            _ = shutdown.triggered() => return Err(FetchError::Cancelled),
            result = tokio::time::timeout(self.timeout, self.download(request)) => {
                result.map_err(|_| FetchError::Timeout(self.timeout))??
            }
        };

        let document = parse_document(&bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
        tracing::debug!(
            url = %url,
            bytes = bytes.len(),
            items = document.items.len(),
            "Fetched feed document"
        );
        Ok(document)
    }

    async fn download(&self, request: reqwest::Request) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .execute(request)
            .await
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), url = %response.url(), "Non-success status, decoding body anyway");
        }

        read_limited_bytes(response, self.max_bytes).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::BodyRead)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
