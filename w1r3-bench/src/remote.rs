//! Storage clients the benchmark runs against.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;

/// A storage frontend the benchmark uploads to and downloads from.
#[async_trait]
pub trait ObjectClient: Send + Sync + std::fmt::Debug {
    /// Uploads the payload under the given object name.
    async fn upload(&self, object: &str, payload: Bytes) -> Result<()>;

    /// Downloads the object, returning the number of bytes received.
    async fn download(&self, object: &str) -> Result<u64>;

    /// Deletes the object.
    async fn delete(&self, object: &str) -> Result<()>;
}

/// An [`ObjectClient`] using plain HTTP against a storage frontend.
#[derive(Debug)]
pub struct HttpRemote {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpRemote {
    /// Creates a client for the given base URL.
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, object: &str) -> String {
        format!("{}/{object}", self.endpoint)
    }
}

#[async_trait]
impl ObjectClient for HttpRemote {
    async fn upload(&self, object: &str, payload: Bytes) -> Result<()> {
        self.client
            .put(self.url(object))
            .body(payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("failed to upload `{object}`"))?;
        Ok(())
    }

    async fn download(&self, object: &str) -> Result<u64> {
        let mut response = self
            .client
            .get(self.url(object))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("failed to download `{object}`"))?;

        // Drain the body chunk by chunk; buffering 100MB objects in memory
        // would dominate the allocation measurement.
        let mut received = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("failed to read body of `{object}`"))?
        {
            received += chunk.len() as u64;
        }
        Ok(received)
    }

    async fn delete(&self, object: &str) -> Result<()> {
        self.client
            .delete(self.url(object))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("failed to delete `{object}`"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_without_double_slashes() {
        let remote = HttpRemote::new("http://127.0.0.1:8888/");
        assert_eq!(remote.url("abc-123"), "http://127.0.0.1:8888/abc-123");

        let remote = HttpRemote::new("http://storage.internal/bucket");
        assert_eq!(remote.url("x"), "http://storage.internal/bucket/x");
    }
}
