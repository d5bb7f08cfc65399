//! # Analytics Module
//!
//! Fetches chart and dashboard data from Footprint Network and Dune and
//! normalizes it into JSON.
//!
//! - `classifier` - picks an adapter from the URL
//! - `services` - one adapter pair per provider
//! - `transport` - session-replaying HTTP client with bounded retry (Dune)
//! - `proxy_pool` - optional pool of verified public proxies
//! - `dispatch` - the single entry point tying these together

pub mod classifier;
pub mod dispatch;
pub mod models;
pub mod proxy_pool;
pub mod services;
pub mod transport;

pub use dispatch::Dispatcher;
pub use models::{ErrorKind, FetchError, FetchResult};
