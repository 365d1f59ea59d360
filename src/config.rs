use clap::builder::BoolishValueParser;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

use crate::domain::{Endpoints, FetchError, FetchSettings, FetchStrategy, ProxyRoute, RelayRule, Result};

pub const APP_NAME: &str = "catalogproxy";

#[derive(Parser, Debug)]
#[command(
    version = env!("CATALOGPROXY_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Serves an external product catalog through resilient fetches"
)]
pub struct Opts {
    /// listen on this network address
    #[arg(long, short = 'b', env = "CATALOGPROXY_BIND", default_value = "127.0.0.1:3000")]
    pub bind: String,

    /// configuration file, created with defaults when missing
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// serve fixture data without contacting the catalog
    #[arg(long, env = "CATALOG_MOCK_MODE", value_parser = BoolishValueParser::new())]
    pub mock: bool,

    /// override the catalog base URL
    #[arg(long, env = "CATALOG_BASE_URL")]
    pub catalog_base_url: Option<String>,

    /// override the image CDN base URL
    #[arg(long, env = "IMAGE_BASE_URL")]
    pub image_base_url: Option<String>,

    /// sequential or racing
    #[arg(long, env = "FETCH_STRATEGY")]
    pub strategy: Option<FetchStrategy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub catalog_base_url: String,
    pub image_base_url: String,
    pub mock_mode: bool,
    pub fetch: FetchSettings,
    pub relays: Vec<RelayRule>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog_base_url: "https://www.noon.com".into(),
            image_base_url: "https://f.nooncdn.com".into(),
            mock_mode: false,
            fetch: FetchSettings::default(),
            relays: RelayRule::default_relays(),
        }
    }
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let loaded = match path {
            Some(path) => confy::load_path(path),
            None => confy::load(APP_NAME, None),
        };
        loaded.map_err(|e| FetchError::Configuration(format!("Failed to load configuration: {}", e)))
    }

    pub fn with_overrides(mut self, opts: &Opts) -> Self {
        if opts.mock {
            self.mock_mode = true;
        }
        if let Some(url) = &opts.catalog_base_url {
            self.catalog_base_url = url.clone();
        }
        if let Some(url) = &opts.image_base_url {
            self.image_base_url = url.clone();
        }
        if let Some(strategy) = opts.strategy {
            self.fetch.strategy = strategy;
        }
        self
    }

    pub fn endpoints(&self) -> Result<Endpoints> {
        Ok(Endpoints {
            catalog_base: parse_base("catalog_base_url", &self.catalog_base_url)?,
            image_base: parse_base("image_base_url", &self.image_base_url)?,
        })
    }

    /// Enabled relays, in configuration order.
    pub fn relay_routes(&self) -> Result<Vec<ProxyRoute>> {
        let mut names = HashSet::new();
        let mut routes = Vec::new();

        for rule in &self.relays {
            if rule.name.trim().is_empty() {
                return Err(FetchError::Configuration("relay with an empty name".into()));
            }
            if !names.insert(rule.name.as_str()) {
                return Err(FetchError::Configuration(format!("duplicate relay name: {}", rule.name)));
            }
            parse_base(&format!("relay {}", rule.name), &rule.template)?;
            if rule.enabled {
                routes.push(rule.to_route());
            }
        }
        Ok(routes)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.attempt_timeout_ms == 0 {
            return Err(FetchError::Configuration("fetch.attempt_timeout_ms must be positive".into()));
        }
        self.endpoints()?;
        self.relay_routes()?;
        Ok(())
    }
}

fn parse_base(field: &str, raw: &str) -> Result<Url> {
    let url: Url = raw
        .parse()
        .map_err(|e| FetchError::Configuration(format!("{} is not a valid URL ({}): {}", field, raw, e)))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(FetchError::Configuration(format!(
            "{} must be an absolute http(s) URL: {}",
            field, raw
        ))),
    }
}
