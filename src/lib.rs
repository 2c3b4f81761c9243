//! Miniproxy - A lightweight caching HTTP forward proxy
//!
//! Accepts HTTP/1.x requests, serves repeated requests from an in-memory
//! LRU response cache, and relays everything else to the origin while
//! capturing the response for insertion.

pub mod cache;
pub mod config;
pub mod error;
pub mod proxy;

pub use cache::{CacheStore, SharedCache};
pub use config::Config;
pub use error::ProxyError;
