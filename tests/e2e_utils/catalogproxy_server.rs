#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use catalogproxy::adapters::{serve, HyperCatalogAdapter, ReqwestHttpClient};
use catalogproxy::config::AppConfig;
use catalogproxy::domain::{CatalogService, FetchSettings, RelayRule};

use super::stub_upstream::StubUpstream;

pub const RELAY_PREFIXES: [&str; 3] = ["/relay1", "/relay2", "/relay3"];

/// Config pointing the catalog, the CDN and three relays at the stub.
pub fn stub_config(upstream: &StubUpstream, fetch: FetchSettings) -> AppConfig {
    let base = upstream.base_url();
    AppConfig {
        catalog_base_url: base.clone(),
        image_base_url: base.clone(),
        mock_mode: false,
        fetch,
        relays: vec![
            RelayRule::new("one", &format!("{}/relay1/raw?url=", base)),
            RelayRule::new("two", &format!("{}/relay2/?", base)),
            RelayRule::new("three", &format!("{}/relay3/proxy?quest=", base)),
        ],
    }
}

pub struct TestCatalogProxyServer {
    addr: SocketAddr,
    _server_handle: JoinHandle<()>,
}

impl TestCatalogProxyServer {
    pub async fn start(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let service = CatalogService::new(
            Arc::new(ReqwestHttpClient::new()?),
            config.relay_routes()?,
            config.endpoints()?,
            config.fetch.clone(),
        )
        .with_mock_mode(config.mock_mode);
        let adapter = Arc::new(HyperCatalogAdapter::new(Arc::new(service)));

        let server_handle = tokio::spawn(serve(listener, adapter));

        Ok(Self {
            addr,
            _server_handle: server_handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
