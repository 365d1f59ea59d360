pub mod errors;
pub mod fetcher;
pub mod fixtures;
pub mod models;
pub mod service;

pub use errors::*;
pub use fetcher::ResilientFetcher;
pub use models::*;
pub use service::{CatalogService, Endpoints};
