use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::{FetchError, Result, UpstreamRequest, UpstreamResponse};
use crate::ports::HttpClientPort;

/// Outbound client shared by every request; reqwest pools connections per host.
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        // System proxies would sit in front of the relays and the direct route alike.
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| FetchError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttpClient {
    async fn execute(&self, request: &UpstreamRequest) -> Result<UpstreamResponse> {
        let http_response = self
            .client
            .get(request.url.as_str())
            .headers(build_headers(&request.headers))
            .send()
            .await
            .map_err(|e| FetchError::NetworkFailure(format!("HTTP request failed: {}", e)))?;

        let status = http_response.status();

        let headers: HashMap<String, String> = http_response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|val| (k.to_string(), val.to_string())))
            .collect();

        let body = http_response
            .bytes()
            .await
            .map_err(|e| FetchError::NetworkFailure(format!("Failed to read response body: {}", e)))?
            .to_vec();

        Ok(UpstreamResponse::new(status).with_headers(headers).with_body(body))
    }
}

fn build_headers(headers: &[(String, String)]) -> reqwest::header::HeaderMap {
    let mut header_map = reqwest::header::HeaderMap::new();

    for (key, value) in headers {
        if let (Ok(name), Ok(val)) = (
            key.parse::<reqwest::header::HeaderName>(),
            value.parse::<reqwest::header::HeaderValue>(),
        ) {
            header_map.insert(name, val);
        }
    }

    header_map
}
