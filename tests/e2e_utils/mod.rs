#![cfg(test)]
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod catalogproxy_server;
pub mod stub_upstream;

pub use catalogproxy_server::{http_client, stub_config, TestCatalogProxyServer, RELAY_PREFIXES};
pub use stub_upstream::{StubRoute, StubUpstream};
