use crate::domain::{Result, UpstreamRequest, UpstreamResponse};
use async_trait::async_trait;

/// Port for outbound HTTP exchanges with the catalog, its relays and the CDN
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// Send one GET request and read the whole response body
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    async fn execute(&self, request: &UpstreamRequest) -> Result<UpstreamResponse>;
}
