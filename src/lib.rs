// src/lib.rs

use std::sync::Arc;

pub mod analytics;
pub mod api;
pub mod config;
pub mod mcp;
pub mod utils;

use analytics::{proxy_pool::ProxyPool, Dispatcher};

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: config::Config,
    /// Routes dashboard and chart URLs to the provider adapters
    pub dispatcher: Dispatcher,
    /// Background-refreshed proxies, present only when the pool is enabled
    pub proxy_pool: Option<Arc<ProxyPool>>,
}

impl AppState {
    /// Wires the dispatcher to the pool; the caller decides whether to start its refresher.
    pub fn new(config: config::Config, proxy_pool: Option<Arc<ProxyPool>>) -> anyhow::Result<Self> {
        let dispatcher = Dispatcher::new(&config, proxy_pool.clone())?;
        Ok(Self {
            config,
            dispatcher,
            proxy_pool,
        })
    }
}
