pub mod cache_key;
pub mod cached_client;
pub mod disk_cache;
pub mod fetcher;
pub mod http_cache;
pub mod rest_mapper;

pub use cache_key::DiscoveryCacheKey;
pub use rest_mapper::{DeferredRestMapper, ResourceMapping, RestMapper};
