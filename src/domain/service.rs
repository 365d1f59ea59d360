use serde_json::json;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use url::Url;

use super::fetcher::{ResilientFetcher, RELAY_USER_AGENT};
use super::{
    fixtures, ApiResponse, CatalogQuery, FetchError, FetchSettings, FetchTarget, ProductQuery, ProxyRoute, StatusCode,
    UpstreamRequest,
};
use crate::ports::HttpClientPort;

pub const LISTING_CACHE_CONTROL: &str = "public, s-maxage=1800, stale-while-revalidate=3600";
pub const PRODUCT_CACHE_CONTROL: &str = "public, s-maxage=3600, stale-while-revalidate=86400";
pub const IMAGE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
pub const FALLBACK_HEADER: &str = "x-catalog-fallback";

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub catalog_base: Url,
    pub image_base: Url,
}

/// Logic behind the listing, product and image endpoints.
#[derive(Clone)]
pub struct CatalogService {
    fetcher: ResilientFetcher,
    http_client: Arc<dyn HttpClientPort>,
    endpoints: Endpoints,
    settings: FetchSettings,
    mock_mode: bool,
}

impl CatalogService {
    pub fn new(
        http_client: Arc<dyn HttpClientPort>,
        relays: Vec<ProxyRoute>,
        endpoints: Endpoints,
        settings: FetchSettings,
    ) -> Self {
        let fetcher = ResilientFetcher::new(http_client.clone(), relays, &endpoints.catalog_base)
            .with_strategy(settings.strategy)
            .with_status_policy(settings.status_policy);

        Self {
            fetcher,
            http_client,
            endpoints,
            settings,
            mock_mode: false,
        }
    }

    pub fn with_mock_mode(mut self, mock_mode: bool) -> Self {
        self.mock_mode = mock_mode;
        self
    }

    pub async fn catalog_listing(&self, page: Option<&str>, category: Option<&str>) -> ApiResponse {
        let query = match CatalogQuery::from_params(page, category) {
            Ok(query) => query,
            Err(e) => return invalid_request(&e),
        };
        info!(page = query.page, category = %query.category, "Fetching products");

        if self.mock_mode {
            return fixture_listing("mock");
        }

        let target = match FetchTarget::catalog_listing(&self.endpoints.catalog_base, &query) {
            Ok(target) => target,
            Err(e) => return invalid_request(&e),
        };

        match self.fetcher.fetch_json(&target, self.settings.attempt_timeout()).await {
            Ok(fetched) => {
                info!(
                    nb_hits = fetched.value["nbHits"].as_u64().unwrap_or(0),
                    nb_pages = fetched.value["nbPages"].as_u64().unwrap_or(0),
                    route = %fetched.fetched.route,
                    "Products fetched"
                );
                ApiResponse::new(StatusCode::OK)
                    .with_header("content-type", "application/json")
                    .with_header("cache-control", LISTING_CACHE_CONTROL)
                    .with_body(fetched.text)
            }
            Err(e) => {
                error!(kind = e.kind(), url = %target, "Failed to fetch products: {}", e);
                if self.settings.fallback_to_fixtures {
                    return fixture_listing("fixtures");
                }
                ApiResponse::json(
                    failure_status(&e),
                    &json!({
                        "error": "Failed to fetch products",
                        "message": e.to_string(),
                        "details": "Unable to retrieve products through proxy services",
                        "hits": [],
                        "nbPages": 0,
                        "nbHits": 0,
                    }),
                )
            }
        }
    }

    pub async fn product_detail(&self, sku: &str, slug: Option<&str>, offer_code: Option<&str>) -> ApiResponse {
        let query = match ProductQuery::from_params(sku, slug, offer_code) {
            Ok(query) => query,
            Err(e) => return invalid_request(&e),
        };
        info!(sku = %query.sku, slug = ?query.slug, offer_code = ?query.offer_code, "Fetching product details");

        if self.mock_mode {
            return match fixtures::product_json(&query.sku) {
                Some(product) => ApiResponse::json(StatusCode::OK, &product).with_header(FALLBACK_HEADER, "mock"),
                None => ApiResponse::json(
                    StatusCode::NOT_FOUND,
                    &json!({
                        "error": "Product not found",
                        "message": format!("No mock product with SKU {}", query.sku),
                    }),
                ),
            };
        }

        let target = match FetchTarget::product_detail(&self.endpoints.catalog_base, &query) {
            Ok(target) => target,
            Err(e) => return invalid_request(&e),
        };

        match self.fetcher.fetch_json(&target, self.settings.attempt_timeout()).await {
            Ok(fetched) => {
                info!(
                    title = fetched.value["product"]["product_title"].as_str().unwrap_or("N/A"),
                    route = %fetched.fetched.route,
                    "Product fetched"
                );
                ApiResponse::new(StatusCode::OK)
                    .with_header("content-type", "application/json")
                    .with_header("cache-control", PRODUCT_CACHE_CONTROL)
                    .with_body(fetched.text)
            }
            Err(e) => {
                error!(kind = e.kind(), url = %target, "Failed to fetch product details: {}", e);
                ApiResponse::json(
                    failure_status(&e),
                    &json!({
                        "error": "Failed to fetch product details",
                        "message": e.to_string(),
                        "details": "Unable to retrieve product through proxy services",
                    }),
                )
            }
        }
    }

    /// Proxies one CDN image so clients never see the CDN host.
    pub async fn image(&self, key: Option<&str>) -> ApiResponse {
        let key = match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => key,
            None => return ApiResponse::text(StatusCode::BAD_REQUEST, "Missing image key"),
        };

        let target = match FetchTarget::image(&self.endpoints.image_base, key) {
            Ok(target) => target,
            Err(e) => {
                warn!("Rejected image key: {}", e);
                return ApiResponse::text(StatusCode::BAD_REQUEST, "Invalid image key");
            }
        };

        let request = UpstreamRequest::new(target.url().clone()).with_header("user-agent", RELAY_USER_AGENT);
        let budget = self.settings.attempt_timeout();

        match timeout(budget, self.http_client.execute(&request)).await {
            Ok(Ok(response)) if response.status.is_success() => {
                let content_type = response.header("content-type").unwrap_or("image/jpeg").to_string();
                ApiResponse::new(StatusCode::OK)
                    .with_header("content-type", content_type)
                    .with_header("cache-control", IMAGE_CACHE_CONTROL)
                    .with_body(response.body)
            }
            Ok(Ok(response)) => {
                debug!(url = %target, status = response.status.as_u16(), "Image not found upstream");
                ApiResponse::text(StatusCode::NOT_FOUND, "Image not found")
            }
            Ok(Err(e)) => {
                error!(url = %target, "Image proxy error: {}", e);
                ApiResponse::text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch image")
            }
            Err(_) => {
                error!(url = %target, "Image proxy error: {}", FetchError::Timeout(budget));
                ApiResponse::text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch image")
            }
        }
    }
}

/// A definitive upstream answer is passed through; any other failure,
/// including an unreadable body, means the catalog is unavailable.
fn failure_status(error: &FetchError) -> StatusCode {
    match error {
        FetchError::AllAttemptsExhausted {
            terminal: Some(status), ..
        } => *status,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn invalid_request(error: &FetchError) -> ApiResponse {
    warn!("Rejected request: {}", error);
    ApiResponse::json(
        StatusCode::BAD_REQUEST,
        &json!({
            "error": "Invalid request",
            "message": error.to_string(),
        }),
    )
}

// Degraded data must not be cached by intermediaries.
fn fixture_listing(reason: &str) -> ApiResponse {
    ApiResponse::new(StatusCode::OK)
        .with_header("content-type", "application/json")
        .with_header("cache-control", "no-store")
        .with_header(FALLBACK_HEADER, reason)
        .with_body(fixtures::catalog_json())
}
