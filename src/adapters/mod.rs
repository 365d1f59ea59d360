pub mod hyper_server;
pub mod reqwest_client;

pub use hyper_server::{serve, HyperCatalogAdapter};
pub use reqwest_client::ReqwestHttpClient;
