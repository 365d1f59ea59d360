use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, Response, Uri};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info_span, Instrument};
use uuid::Uuid;

use crate::domain::{ApiResponse, CatalogService, StatusCode};

pub type Body = BoxBody<Bytes, hyper::Error>;

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Listing,
    Product(String),
    Image,
    NotFound,
}

/// Accepts both the short paths and the `/api/...` ones used by the storefront pages.
fn route(path: &str) -> Route {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["catalog"] | ["api", "products"] => Route::Listing,
        ["catalog", sku] | ["api", "products", sku] => Route::Product(sku.to_string()),
        ["image"] | ["api", "image"] => Route::Image,
        _ => Route::NotFound,
    }
}

fn query_params(uri: &Uri) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(query) = uri.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()).into_owned() {
            params.entry(key).or_insert(value);
        }
    }
    params
}

pub struct HyperCatalogAdapter {
    service: Arc<CatalogService>,
}

impl HyperCatalogAdapter {
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self { service }
    }

    pub async fn handle<B: Send>(&self, req: Request<B>) -> Response<Body> {
        let (parts, _) = req.into_parts();
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %parts.method,
            path = %parts.uri.path()
        );

        let api_response = self.dispatch(parts.method, parts.uri).instrument(span.clone()).await;

        into_hyper_response(api_response, request_id).unwrap_or_else(|e| {
            error!(parent: &span, "Failed to build response: {}", e);
            let mut response = Response::new(Empty::<Bytes>::new().map_err(|never| match never {}).boxed());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
    }

    async fn dispatch(&self, method: Method, uri: Uri) -> ApiResponse {
        if method != Method::GET {
            return ApiResponse::text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").with_header("allow", "GET");
        }

        let params = query_params(&uri);
        let param = |name: &str| params.get(name).map(String::as_str);

        match route(uri.path()) {
            Route::Listing => self.service.catalog_listing(param("page"), param("category")).await,
            Route::Product(sku) => {
                self.service
                    .product_detail(&sku, param("url"), param("offerCode"))
                    .await
            }
            Route::Image => self.service.image(param("key")).await,
            Route::NotFound => ApiResponse::text(StatusCode::NOT_FOUND, "Not found"),
        }
    }
}

fn into_hyper_response(
    api_response: ApiResponse,
    request_id: Uuid,
) -> Result<Response<Body>, Box<dyn std::error::Error + Send + Sync>> {
    let mut builder = Response::builder()
        .status(api_response.status)
        .header("x-request-id", request_id.to_string());

    for (key, value) in &api_response.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }

    let body = Full::new(Bytes::from(api_response.body))
        .map_err(|never| match never {})
        .boxed();

    Ok(builder.body(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Endpoints, FetchError, FetchSettings, Result, UpstreamRequest, UpstreamResponse};
    use crate::ports::HttpClientPort;
    use async_trait::async_trait;

    struct UnreachableHttpClient;

    #[async_trait]
    impl HttpClientPort for UnreachableHttpClient {
        async fn execute(&self, _request: &UpstreamRequest) -> Result<UpstreamResponse> {
            Err(FetchError::NetworkFailure("unreachable".into()))
        }
    }

    fn adapter(mock_mode: bool) -> HyperCatalogAdapter {
        let endpoints = Endpoints {
            catalog_base: "http://catalog.test".parse().unwrap(),
            image_base: "http://cdn.test".parse().unwrap(),
        };
        let settings = FetchSettings {
            attempt_timeout_ms: 100,
            ..FetchSettings::default()
        };
        let service =
            CatalogService::new(Arc::new(UnreachableHttpClient), vec![], endpoints, settings).with_mock_mode(mock_mode);
        HyperCatalogAdapter::new(Arc::new(service))
    }

    fn get(uri: &str) -> Request<()> {
        Request::builder().uri(uri).body(()).unwrap()
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_route_matching() {
        assert_eq!(route("/catalog"), Route::Listing);
        assert_eq!(route("/api/products/"), Route::Listing);
        assert_eq!(route("/catalog/N123"), Route::Product("N123".into()));
        assert_eq!(route("/api/products/N123"), Route::Product("N123".into()));
        assert_eq!(route("/api/image"), Route::Image);
        assert_eq!(route("/catalogue"), Route::NotFound);
        assert_eq!(route("/catalog/N1/extra"), Route::NotFound);
    }

    #[test]
    fn test_query_params_decode_and_keep_first() {
        let uri: Uri = "/catalog?category=fashion%2Fwomen-31229&page=2&page=9".parse().unwrap();

        let params = query_params(&uri);

        assert_eq!(params["category"], "fashion/women-31229");
        assert_eq!(params["page"], "2");
    }

    #[tokio::test]
    async fn test_listing_in_mock_mode() {
        let response = adapter(true).handle(get("/catalog?page=1")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(response.headers()["x-catalog-fallback"], "mock");
        assert!(body_text(response).await.contains("\"nbHits\": 800"));
    }

    #[tokio::test]
    async fn test_unknown_path_and_method() {
        let adapter = adapter(false);

        let not_found = adapter.handle(get("/nope")).await;
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let post = Request::builder().method(Method::POST).uri("/catalog").body(()).unwrap();
        let not_allowed = adapter.handle(post).await;
        assert_eq!(not_allowed.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(not_allowed.headers()["allow"], "GET");
    }

    #[tokio::test]
    async fn test_image_without_key() {
        let response = adapter(false).handle(get("/image")).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Missing image key");
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_503() {
        let response = adapter(false).handle(get("/api/products?category=fashion")).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["nbHits"], 0);
    }
}
