pub use hyper::StatusCode;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use url::Url;

use super::{FetchError, Result};

const LISTING_PATH: &str = "_vs/nc/mp-customer-catalog-api/api/v3/u";
const LISTING_SUFFIX: &str = "p-3001";
const LEGACY_PRODUCT_PATH: &str = "_vs/np/api/v2.0/catalog_product";

pub const DEFAULT_CATEGORY: &str = "fashion";

/// Absolute URL of an external catalog resource, built once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget(Url);

impl FetchTarget {
    pub fn new(url: Url) -> Result<Self> {
        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(Self(url)),
            _ => Err(FetchError::InvalidTarget(format!("not an absolute http(s) URL: {}", url))),
        }
    }

    pub fn catalog_listing(base: &Url, query: &CatalogQuery) -> Result<Self> {
        Self::parse(&format!(
            "{}/{}/{}/{}/?page={}",
            trimmed_base(base),
            LISTING_PATH,
            query.category,
            LISTING_SUFFIX,
            query.page
        ))
    }

    pub fn product_detail(base: &Url, query: &ProductQuery) -> Result<Self> {
        match (&query.slug, &query.offer_code) {
            (Some(slug), Some(offer_code)) => Self::parse(&format!(
                "{}/{}/{}/{}/p/?o={}",
                trimmed_base(base),
                LISTING_PATH,
                slug,
                query.sku,
                offer_code
            )),
            _ => Self::parse(&format!(
                "{}/{}?sku={}",
                trimmed_base(base),
                LEGACY_PRODUCT_PATH,
                query.sku
            )),
        }
    }

    /// Image URL on the CDN. The key must not be able to move the request
    /// off the CDN host or out of the `/p/` tree.
    pub fn image(base: &Url, key: &str) -> Result<Self> {
        if key.contains("..")
            || key
                .chars()
                .any(|ch| ch.is_whitespace() || matches!(ch, '?' | '#' | '\\' | '%'))
        {
            return Err(FetchError::InvalidTarget(format!("illegal image key: {}", key)));
        }

        let key = key.trim_start_matches('/');
        let target = Self::parse(&format!("{}/p/{}.jpg", trimmed_base(base), key))?;

        let base_prefix = format!("{}/p/", base.path().trim_end_matches('/'));
        if target.0.host_str() != base.host_str()
            || target.0.port_or_known_default() != base.port_or_known_default()
            || !target.0.path().starts_with(&base_prefix)
        {
            return Err(FetchError::InvalidTarget(format!("image key escapes CDN: {}", key)));
        }
        Ok(target)
    }

    fn parse(raw: &str) -> Result<Self> {
        let url = raw
            .parse::<Url>()
            .map_err(|e| FetchError::InvalidTarget(format!("{}: {}", raw, e)))?;
        Self::new(url)
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn trimmed_base(base: &Url) -> &str {
    base.as_str().trim_end_matches('/')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    pub page: u32,
    pub category: String,
}

impl CatalogQuery {
    pub fn from_params(page: Option<&str>, category: Option<&str>) -> Result<Self> {
        let page = match page.map(str::trim).filter(|p| !p.is_empty()) {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| FetchError::InvalidTarget(format!("page must be a positive integer, got {}", raw)))?,
            None => 1,
        };

        let category = match category.map(str::trim).filter(|c| !c.is_empty()) {
            Some(raw) => catalog_path(raw, "category")?,
            None => DEFAULT_CATEGORY.to_string(),
        };

        Ok(Self { page, category })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductQuery {
    pub sku: String,
    pub slug: Option<String>,
    pub offer_code: Option<String>,
}

impl ProductQuery {
    pub fn from_params(sku: &str, slug: Option<&str>, offer_code: Option<&str>) -> Result<Self> {
        let sku = token(sku, "sku")?;
        let slug = match slug.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(catalog_path(raw, "url")?),
            None => None,
        };
        let offer_code = match offer_code.map(str::trim).filter(|o| !o.is_empty()) {
            Some(raw) => Some(token(raw, "offerCode")?),
            None => None,
        };
        Ok(Self { sku, slug, offer_code })
    }
}

fn is_token_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

fn token(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() || !value.chars().all(is_token_char) {
        return Err(FetchError::InvalidTarget(format!("invalid {}: {:?}", field, value)));
    }
    Ok(value.to_string())
}

/// Slash-separated path made of tokens, e.g. `fashion/women-31229`.
fn catalog_path(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim().trim_matches('/');
    let valid = !trimmed.is_empty()
        && trimmed
            .split('/')
            .all(|segment| !segment.is_empty() && segment.chars().all(is_token_char));
    if !valid {
        return Err(FetchError::InvalidTarget(format!("invalid {}: {:?}", field, value)));
    }
    Ok(trimmed.to_string())
}

/// Path taken by one attempt: straight to the target or through a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyRoute {
    Direct,
    Relay { name: String, template: String },
}

impl ProxyRoute {
    pub fn relay(name: impl Into<String>, template: impl Into<String>) -> Self {
        ProxyRoute::Relay {
            name: name.into(),
            template: template.into(),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, ProxyRoute::Direct)
    }

    /// URL requested for this route. Relays embed the encoded target after
    /// their template, which already ends with its own query convention.
    pub fn attempt_url(&self, target: &FetchTarget) -> Result<Url> {
        match self {
            ProxyRoute::Direct => Ok(target.url().clone()),
            ProxyRoute::Relay { name, template } => {
                let encoded: String = url::form_urlencoded::byte_serialize(target.as_str().as_bytes()).collect();
                format!("{}{}", template, encoded)
                    .parse()
                    .map_err(|e| FetchError::Configuration(format!("relay {} has an invalid template: {}", name, e)))
            }
        }
    }
}

impl fmt::Display for ProxyRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyRoute::Direct => write!(f, "direct"),
            ProxyRoute::Relay { name, .. } => write!(f, "relay {}", name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

impl UpstreamRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The attempt that won.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub attempt: usize,
    pub route: ProxyRoute,
    pub response: UpstreamResponse,
    pub elapsed: Duration,
}

impl FetchedResponse {
    /// Body as UTF-8, without any replacement of invalid sequences.
    pub fn text(&self) -> std::result::Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.response.body.clone())
    }
}

#[derive(Debug, Clone)]
pub struct FetchedJson {
    pub fetched: FetchedResponse,
    pub text: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub index: usize,
    pub route: ProxyRoute,
    pub error: FetchError,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    Sequential,
    Racing,
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStrategy::Sequential => write!(f, "sequential"),
            FetchStrategy::Racing => write!(f, "racing"),
        }
    }
}

impl std::str::FromStr for FetchStrategy {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(FetchStrategy::Sequential),
            "racing" => Ok(FetchStrategy::Racing),
            other => Err(FetchError::Configuration(format!("unknown fetch strategy: {}", other))),
        }
    }
}

/// Which non-2xx answers from the direct attempt still go through relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPolicy {
    AlwaysFallback,
    SurfaceNotFound,
}

impl StatusPolicy {
    pub fn is_terminal(&self, route: &ProxyRoute, status: StatusCode) -> bool {
        match self {
            StatusPolicy::AlwaysFallback => false,
            StatusPolicy::SurfaceNotFound => {
                route.is_direct() && (status == StatusCode::NOT_FOUND || status == StatusCode::GONE)
            }
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub strategy: FetchStrategy,
    pub attempt_timeout_ms: u64,
    pub status_policy: StatusPolicy,
    pub fallback_to_fixtures: bool,
}

impl FetchSettings {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            strategy: FetchStrategy::Sequential,
            attempt_timeout_ms: 25_000,
            status_policy: StatusPolicy::AlwaysFallback,
            fallback_to_fixtures: false,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RelayRule {
    pub name: String,
    pub template: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl RelayRule {
    pub fn new(name: &str, template: &str) -> Self {
        Self {
            name: name.to_string(),
            template: template.to_string(),
            enabled: true,
        }
    }

    pub fn default_relays() -> Vec<RelayRule> {
        vec![
            RelayRule::new("allorigins", "https://api.allorigins.win/raw?url="),
            RelayRule::new("corsproxy", "https://corsproxy.io/?"),
            RelayRule::new("codetabs", "https://api.codetabs.com/v1/proxy?quest="),
        ]
    }

    pub fn to_route(&self) -> ProxyRoute {
        ProxyRoute::relay(self.name.clone(), self.template.clone())
    }
}

/// Response handed back to the inbound adapter.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status)
            .with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    pub fn text(status: StatusCode, message: &str) -> Self {
        Self::new(status)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body(message)
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
