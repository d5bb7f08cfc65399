// src/analytics/dispatch.rs

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::classifier::{classify, Route};
use super::models::{FetchError, FetchResult};
use super::proxy_pool::ProxyPool;
use super::services::{dune::DuneClient, footprint::FootprintClient};
use super::transport::DuneTransport;
use crate::config::Config;

/// Routes a dashboard or chart URL to the matching provider adapter.
#[derive(Clone)]
pub struct Dispatcher {
    footprint: FootprintClient,
    dune: DuneClient,
}

impl Dispatcher {
    pub fn new(config: &Config, pool: Option<Arc<ProxyPool>>) -> Result<Self> {
        let transport = DuneTransport::new(config, pool)?;
        Ok(Self {
            footprint: FootprintClient::new(config)?,
            dune: DuneClient::new(config, transport),
        })
    }

    pub async fn fetch(&self, url: &str) -> FetchResult<Value> {
        let url = url.trim();
        let route = classify(url).ok_or(FetchError::UnsupportedUrl)?;
        info!(url, ?route, provider = ?route.provider(), "Fetching analytics data");

        let result = match route {
            Route::FootprintDashboard => self.footprint.fetch_dashboard(url).await,
            Route::FootprintChart => self.footprint.fetch_chart(url).await,
            Route::DuneDashboard => self.dune.fetch_dashboard(url).await,
            Route::DuneQuery => self.dune.fetch_query(url).await,
        };
        if let Err(e) = &result {
            warn!(url, ?route, kind = %e.kind(), error = %e, "Fetch failed");
        }
        result
    }

    /// String-in, string-out form handed to tool callers.
    pub async fn get_dashboard_data(&self, url: &str) -> String {
        render(&self.fetch(url).await)
    }
}

/// Compact JSON of the payload, or of the error object on failure.
pub fn render(result: &FetchResult<Value>) -> String {
    let rendered = match result {
        Ok(payload) => serde_json::to_string(payload),
        Err(e) => serde_json::to_string(&e.to_payload()),
    };
    rendered.unwrap_or_else(|e| encode_failure(&e.to_string()))
}

fn encode_failure(message: &str) -> String {
    json!({ "error": message }).to_string()
}
