use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::NetworkError;

/// Source of raw bytes for a URL. Implemented by [`HttpClient`]; tests swap in fakes.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, NetworkError>;
}

/// One pooled HTTP session shared by every request of a run.
pub struct HttpClient {
    client: reqwest::Client,
    delay: Duration,
}

impl HttpClient {
    pub fn new(user_agent: &str, timeout: Duration, delay: Duration) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::Request {
                url: String::new(),
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, delay })
    }
}

#[async_trait]
impl Fetch for HttpClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>, NetworkError> {
        // Pacing: every request waits first, so the request rate stays bounded.
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| NetworkError::from_reqwest(url, e))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::from_reqwest(url, e))?;
        Ok(body.to_vec())
    }
}
