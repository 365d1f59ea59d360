mod adapter;
mod server;

pub use adapter::HyperCatalogAdapter;
pub use server::serve;
