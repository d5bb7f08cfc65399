// src/analytics/transport.rs

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Proxy};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::proxy_pool::ProxyPool;
use crate::config::Config;

pub const MAX_ATTEMPTS: usize = 2;
pub const GRAPHQL_TIMEOUT: Duration = Duration::from_secs(60);
pub const EXECUTION_TIMEOUT: Duration = Duration::from_secs(120);

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const CHALLENGE_MARKERS: [&str; 4] = [
    "Just a moment",
    "cf-chl",
    "Attention Required",
    "challenge-platform",
];

/// Outcome of a single request.
enum Attempt {
    Json(Value),
    Challenge,
    NotJson(u16),
    Transport(reqwest::Error),
}

/// HTTP client for Dune that replays a captured browser session.
///
/// Every call is a JSON POST with a bounded number of attempts. Nothing is
/// raised past this type: total failure comes back as `None`.
#[derive(Clone)]
pub struct DuneTransport {
    direct: Client,
    headers: HeaderMap,
    static_proxy: Option<Client>,
    pool: Option<Arc<ProxyPool>>,
    graphql_url: String,
    use_proxy: bool,
}

impl DuneTransport {
    pub fn new(config: &Config, pool: Option<Arc<ProxyPool>>) -> Result<Self> {
        let headers = session_headers(config)?;
        let direct = Client::builder()
            .default_headers(headers.clone())
            .build()
            .context("Failed to build Dune HTTP client")?;

        let static_proxy = match &config.proxy_host {
            Some(host) => {
                let mut proxy = Proxy::all(proxy_url(host))
                    .with_context(|| format!("Invalid PROXY_HOST '{}'", host))?;
                if let Some(user) = &config.proxy_username {
                    let password = config
                        .proxy_password
                        .as_ref()
                        .map(|p| p.expose_secret().clone())
                        .unwrap_or_default();
                    proxy = proxy.basic_auth(user, &password);
                }
                Some(
                    Client::builder()
                        .default_headers(headers.clone())
                        .proxy(proxy)
                        .build()
                        .context("Failed to build proxied Dune HTTP client")?,
                )
            }
            None => None,
        };

        Ok(Self {
            direct,
            headers,
            static_proxy,
            pool,
            graphql_url: config.dune_graphql_url.clone(),
            use_proxy: config.wants_proxy(),
        })
    }

    /// Posts a named GraphQL operation to the Dune endpoint.
    pub async fn graphql(&self, operation_name: &str, query: &str, variables: Value) -> Option<Value> {
        let body = json!({
            "operationName": operation_name,
            "query": query,
            "variables": variables,
        });
        self.post_json(&self.graphql_url, &body, GRAPHQL_TIMEOUT).await
    }

    /// Sends `body` up to `MAX_ATTEMPTS` times until a JSON document comes back.
    /// When proxied, exhausting the attempts buys one direct attempt.
    pub async fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Option<Value> {
        let proxied = if self.use_proxy {
            self.proxied_client().await
        } else {
            None
        };
        let client = proxied.as_ref().unwrap_or(&self.direct);

        for attempt in 1..=MAX_ATTEMPTS {
            match send(client, url, body, timeout).await {
                Attempt::Json(value) => return Some(value),
                Attempt::Challenge => {
                    warn!(url, attempt, "Anti-bot challenge page received, retrying");
                }
                Attempt::NotJson(status) => {
                    warn!(url, attempt, status, "Response body was not JSON");
                }
                Attempt::Transport(e) => {
                    warn!(url, attempt, error = %e, "Request failed");
                }
            }
        }

        if proxied.is_some() {
            info!(url, "Proxied attempts exhausted, trying once without proxy");
            if let Attempt::Json(value) = send(&self.direct, url, body, timeout).await {
                return Some(value);
            }
        }

        warn!(url, "Giving up after {} attempts", MAX_ATTEMPTS);
        None
    }

    /// The static proxy when configured, otherwise one drawn from the pool.
    async fn proxied_client(&self) -> Option<Client> {
        if let Some(client) = &self.static_proxy {
            return Some(client.clone());
        }
        let proxy = self.pool.as_ref()?.get().await?;
        debug!(proxy = %proxy, "Using pooled proxy");
        match Proxy::all(&proxy).and_then(|p| {
            Client::builder()
                .default_headers(self.headers.clone())
                .proxy(p)
                .build()
        }) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(proxy = %proxy, error = %e, "Pooled proxy unusable, going direct");
                None
            }
        }
    }
}

async fn send(client: &Client, url: &str, body: &Value, timeout: Duration) -> Attempt {
    let resp = match client.post(url).json(body).timeout(timeout).send().await {
        Ok(r) => r,
        Err(e) => return Attempt::Transport(e),
    };
    let status = resp.status().as_u16();
    let text = match resp.text().await {
        Ok(t) => t,
        Err(e) => return Attempt::Transport(e),
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => {
            debug!(url, status, "Received JSON response");
            Attempt::Json(value)
        }
        Err(_) if is_challenge_page(&text) => Attempt::Challenge,
        Err(_) => Attempt::NotJson(status),
    }
}

pub fn is_challenge_page(body: &str) -> bool {
    CHALLENGE_MARKERS.iter().any(|marker| body.contains(marker))
}

fn proxy_url(host: &str) -> String {
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

fn session_headers(config: &Config) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::ORIGIN, HeaderValue::from_static("https://dune.com"));
    headers.insert(header::REFERER, HeaderValue::from_static("https://dune.com/"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-site"));

    let user_agent = config.dune_user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
    headers.insert(
        header::USER_AGENT,
        HeaderValue::from_str(user_agent).context("DUNE_USER_AGENT is not a valid header value")?,
    );

    if let Some(cookie) = &config.dune_cookie {
        let mut value = HeaderValue::from_str(cookie.expose_secret())
            .context("DUNE_COOKIE is not a valid header value")?;
        value.set_sensitive(true);
        headers.insert(header::COOKIE, value);
    }
    Ok(headers)
}
