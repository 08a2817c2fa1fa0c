use anyhow::{Context, Result as AnyhowResult};
use std::future::Future;
use std::time::Duration;

/// Retrieves documents from a directory authority.
pub trait DirectoryClient {
    /// Fetches `resource` (e.g. `/tor/server/d/<D1>+<D2>`) from `authority`
    /// (`host[:port]`). A non-success response is an error.
    fn fetch(
        &self,
        authority: &str,
        resource: &str,
    ) -> impl Future<Output = AnyhowResult<Vec<u8>>> + Send;
}

/// Fetches directory documents over plain HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpDirectoryClient {
    client: reqwest::Client,
}

impl HttpDirectoryClient {
    /// Creates a client that gives up on connecting after `timeout`, and on the whole
    /// request after four times that.
    pub fn new(timeout: Duration) -> AnyhowResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout * 4)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(HttpDirectoryClient { client })
    }
}

/// Builds the URL of `resource` on `authority`.
pub fn resource_url(authority: &str, resource: &str) -> String {
    format!("http://{}{}", authority.trim_end_matches('/'), resource)
}

impl DirectoryClient for HttpDirectoryClient {
    fn fetch(
        &self,
        authority: &str,
        resource: &str,
    ) -> impl Future<Output = AnyhowResult<Vec<u8>>> + Send {
        let url = resource_url(authority, resource);
        let request = self.client.get(&url);
        async move {
            let response = request
                .send()
                .await
                .with_context(|| format!("Failed to get {}", url))?
                .error_for_status()
                .with_context(|| format!("Unsuccessful response for {}", url))?;
            let body = response
                .bytes()
                .await
                .with_context(|| format!("Failed to read response body of {}", url))?;
            Ok(body.to_vec())
        }
    }
}
