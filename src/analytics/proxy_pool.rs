//! Best-effort pool of public HTTP proxies.
//!
//! The pool pulls a plain-text `host:port` list from one source, checks every
//! candidate concurrently on a bounded number of workers and keeps the ones
//! that answered. Consumers ask for a random working proxy and must carry on
//! without one when the pool is empty.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{self, StreamExt};
use rand::seq::IteratorRandom;
use reqwest::{Client, Proxy};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;

const LIST_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Decides whether a single proxy is usable. Checks must not touch pool state.
#[async_trait]
pub trait ProxyVerifier: Send + Sync {
    async fn verify(&self, proxy: &str) -> bool;
}

/// Sends one GET through the proxy and accepts any 2xx answer.
pub struct HttpProxyVerifier {
    check_url: String,
    timeout: Duration,
}

impl HttpProxyVerifier {
    pub fn new(check_url: impl Into<String>) -> Self {
        Self {
            check_url: check_url.into(),
            timeout: CHECK_TIMEOUT,
        }
    }
}

#[async_trait]
impl ProxyVerifier for HttpProxyVerifier {
    async fn verify(&self, proxy: &str) -> bool {
        let client = match Proxy::all(proxy).and_then(|p| {
            Client::builder().proxy(p).timeout(self.timeout).build()
        }) {
            Ok(c) => c,
            Err(e) => {
                debug!(proxy, error = %e, "Skipping unusable proxy address");
                return false;
            }
        };
        match client.get(&self.check_url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolPhase {
    Uninitialized,
    Populating,
    Ready,
}

#[derive(Debug)]
struct PoolState {
    phase: PoolPhase,
    candidates: HashSet<String>,
    working: HashSet<String>,
    last_refresh: Option<DateTime<Utc>>,
}

/// Snapshot for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub phase: PoolPhase,
    pub candidates: usize,
    pub working: usize,
    pub last_refresh: Option<DateTime<Utc>>,
}

pub struct ProxyPool {
    // Every read and write of the proxy sets goes through this one lock.
    state: Mutex<PoolState>,
    source_url: String,
    client: Client,
    verifier: Arc<dyn ProxyVerifier>,
    workers: usize,
    refresh_interval: Duration,
    retry_interval: Duration,
}

impl ProxyPool {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_verifier(
            config.proxy_list_url.clone(),
            Arc::new(HttpProxyVerifier::new(config.proxy_check_url.clone())),
            config.proxy_check_workers,
        )?
        .with_intervals(
            Duration::from_secs(config.proxy_refresh_secs),
            Duration::from_secs(config.proxy_retry_secs),
        ))
    }

    pub fn with_verifier(
        source_url: impl Into<String>,
        verifier: Arc<dyn ProxyVerifier>,
        workers: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(LIST_FETCH_TIMEOUT)
            .build()
            .context("Failed to build proxy list client")?;
        Ok(Self {
            state: Mutex::new(PoolState {
                phase: PoolPhase::Uninitialized,
                candidates: HashSet::new(),
                working: HashSet::new(),
                last_refresh: None,
            }),
            source_url: source_url.into(),
            client,
            verifier,
            workers: workers.max(1),
            refresh_interval: Duration::from_secs(1800),
            retry_interval: Duration::from_secs(300),
        })
    }

    pub fn with_intervals(mut self, refresh: Duration, retry: Duration) -> Self {
        self.refresh_interval = refresh;
        self.retry_interval = retry;
        self
    }

    /// A uniformly random working proxy, or `None` when none has been verified.
    pub async fn get(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.working.iter().choose(&mut rand::thread_rng()).cloned()
    }

    pub async fn status(&self) -> PoolStatus {
        let state = self.state.lock().await;
        PoolStatus {
            phase: state.phase,
            candidates: state.candidates.len(),
            working: state.working.len(),
            last_refresh: state.last_refresh,
        }
    }

    /// Re-reads the source list and re-verifies every candidate.
    /// The previous working set keeps serving `get` until the new one replaces it.
    /// Returns the number of working proxies, which may be zero.
    pub async fn refresh(&self) -> Result<usize> {
        let previous = {
            let mut state = self.state.lock().await;
            let previous = state.phase;
            state.phase = PoolPhase::Populating;
            previous
        };

        let candidates = match self.fetch_candidates().await {
            Ok(c) => c,
            Err(e) => {
                self.state.lock().await.phase = previous;
                return Err(e);
            }
        };
        debug!(count = candidates.len(), "Fetched proxy candidates");

        let candidate_set: HashSet<String> = candidates.iter().cloned().collect();
        let verifier = &self.verifier;
        let working: HashSet<String> = stream::iter(candidates)
            .map(|proxy| async move { verifier.verify(&proxy).await.then_some(proxy) })
            .buffer_unordered(self.workers)
            .filter_map(future::ready)
            .collect()
            .await;

        let mut state = self.state.lock().await;
        state.candidates = candidate_set;
        state.working = working;
        state.phase = PoolPhase::Ready;
        state.last_refresh = Some(Utc::now());
        info!(
            candidates = state.candidates.len(),
            working = state.working.len(),
            "Proxy pool refreshed"
        );
        Ok(state.working.len())
    }

    async fn fetch_candidates(&self) -> Result<Vec<String>> {
        let body = self
            .client
            .get(&self.source_url)
            .send()
            .await
            .context("Failed to download proxy list")?
            .error_for_status()
            .context("Proxy list source returned an error status")?
            .text()
            .await
            .context("Failed to read proxy list body")?;
        Ok(parse_proxy_list(&body))
    }

    /// Runs `refresh` forever on a background task: the regular interval after
    /// a successful pass, the shorter retry interval after a failed one.
    pub fn spawn_refresher(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let wait = match self.refresh().await {
                    Ok(working) => {
                        debug!(working, "Next proxy refresh in {:?}", self.refresh_interval);
                        self.refresh_interval
                    }
                    Err(e) => {
                        warn!(error = %e, "Proxy pool refresh failed");
                        self.retry_interval
                    }
                };
                tokio::time::sleep(wait).await;
            }
        })
    }
}

/// One proxy per line, `host:port` with or without an `http://` prefix.
/// Blank lines, comments and duplicates are dropped; input order is kept.
pub fn parse_proxy_list(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.trim_start_matches("http://"))
        .filter(|addr| addr.contains(':'))
        .map(|addr| format!("http://{}", addr))
        .filter(|proxy| seen.insert(proxy.clone()))
        .collect()
}
