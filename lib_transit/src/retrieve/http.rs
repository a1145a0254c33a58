//! # HTTP Text Retrieval
//!
//! A thin asynchronous client around `reqwest` that fetches documents as text.
//! Transient failures (connection errors, 5xx, 429) are retried with
//! exponential backoff by `reqwest-retry`; every request carries a timeout.

use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::error::BootstrapError;

/// Browser-like agent; the city page serves a stripped document otherwise.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0";

/// Fetches text documents with retries.
#[derive(Clone)]
pub struct TextClient {
    inner: ClientWithMiddleware,
}

impl TextClient {
    /// Creates a client whose requests time out after `timeout` and are
    /// retried up to `max_retries` times.
    ///
    /// # Errors
    /// Returns `BootstrapError::Http` if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self, BootstrapError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BootstrapError::Http { url: String::new(), reason: e.to_string() })?;

        // Configure an exponential backoff policy for transient failures
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let inner = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { inner })
    }

    /// GETs `url` and returns the body of a 2xx response.
    ///
    /// # Errors
    /// `BootstrapError::Status` for non-success statuses, `BootstrapError::Http`
    /// for transport failures and unreadable bodies.
    pub async fn get_text(&self, url: &str) -> Result<String, BootstrapError> {
        let http_err = |reason: String| BootstrapError::Http { url: url.to_string(), reason };

        let response = self.inner.get(url).send().await.map_err(|e| http_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BootstrapError::Status { url: url.to_string(), status: status.as_u16() });
        }

        let body = response.text().await.map_err(|e| http_err(e.to_string()))?;
        log::debug!("Fetched {} ({} bytes)", url, body.len());
        Ok(body)
    }
}
