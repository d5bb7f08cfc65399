// src/config.rs

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use secrecy::SecretString;

pub const DEFAULT_FOOTPRINT_API_BASE: &str = "https://www.footprint.network/api/v1";
pub const DEFAULT_FOOTPRINT_DATA_API_URL: &str =
    "https://vip.footprint.network/api/v1/dataApi/dashcard/data";
pub const DEFAULT_DUNE_GRAPHQL_URL: &str = "https://core-api.dune.com/public/graphql";
pub const DEFAULT_DUNE_EXECUTION_URL: &str = "https://core-api.dune.com/public/execution";
pub const DEFAULT_PROXY_LIST_URL: &str =
    "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/http.txt";
pub const DEFAULT_PROXY_CHECK_URL: &str = "http://httpbin.org/ip";

// A struct to hold all configuration, loaded once at startup from the .env file.
#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub port: u16,

    // Footprint Network endpoints
    pub footprint_api_base: String,
    pub footprint_data_api_url: String,

    // Dune endpoints and the captured browser session replayed against them
    pub dune_graphql_url: String,
    pub dune_execution_url: String,
    pub dune_cookie: Option<SecretString>,
    pub dune_user_agent: Option<String>,

    /// Static outbound proxy. Takes precedence over the proxy pool when set.
    pub proxy_host: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<SecretString>,

    // Proxy pool
    pub proxy_pool_enabled: bool,
    pub proxy_list_url: String,
    pub proxy_check_url: String,
    pub proxy_refresh_secs: u64,
    pub proxy_retry_secs: u64,
    pub proxy_check_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            footprint_api_base: DEFAULT_FOOTPRINT_API_BASE.to_string(),
            footprint_data_api_url: DEFAULT_FOOTPRINT_DATA_API_URL.to_string(),
            dune_graphql_url: DEFAULT_DUNE_GRAPHQL_URL.to_string(),
            dune_execution_url: DEFAULT_DUNE_EXECUTION_URL.to_string(),
            dune_cookie: None,
            dune_user_agent: None,
            proxy_host: None,
            proxy_username: None,
            proxy_password: None,
            proxy_pool_enabled: false,
            proxy_list_url: DEFAULT_PROXY_LIST_URL.to_string(),
            proxy_check_url: DEFAULT_PROXY_CHECK_URL.to_string(),
            proxy_refresh_secs: 1800,
            proxy_retry_secs: 300,
            proxy_check_workers: 32,
        }
    }
}

impl Config {
    /// Whether Dune requests should go out through a proxy at all.
    pub fn wants_proxy(&self) -> bool {
        self.proxy_host.is_some() || self.proxy_pool_enabled
    }

    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load variables from the .env file into the environment
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        Ok(Config {
            port: parse_var("PORT", defaults.port)?,

            footprint_api_base: env::var("FOOTPRINT_API_BASE")
                .unwrap_or(defaults.footprint_api_base),
            footprint_data_api_url: env::var("FOOTPRINT_DATA_API_URL")
                .unwrap_or(defaults.footprint_data_api_url),

            dune_graphql_url: env::var("DUNE_GRAPHQL_URL").unwrap_or(defaults.dune_graphql_url),
            dune_execution_url: env::var("DUNE_EXECUTION_URL")
                .unwrap_or(defaults.dune_execution_url),
            dune_cookie: non_empty_var("DUNE_COOKIE").map(SecretString::new),
            dune_user_agent: non_empty_var("DUNE_USER_AGENT"),

            proxy_host: non_empty_var("PROXY_HOST"),
            proxy_username: non_empty_var("PROXY_USERNAME"),
            proxy_password: non_empty_var("PROXY_PASSWORD").map(SecretString::new),

            proxy_pool_enabled: parse_var("PROXY_POOL_ENABLED", defaults.proxy_pool_enabled)?,
            proxy_list_url: env::var("PROXY_LIST_URL").unwrap_or(defaults.proxy_list_url),
            proxy_check_url: env::var("PROXY_CHECK_URL").unwrap_or(defaults.proxy_check_url),
            proxy_refresh_secs: parse_var("PROXY_REFRESH_SECS", defaults.proxy_refresh_secs)?,
            proxy_retry_secs: parse_var("PROXY_RETRY_SECS", defaults.proxy_retry_secs)?,
            proxy_check_workers: parse_var("PROXY_CHECK_WORKERS", defaults.proxy_check_workers)?,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} must be a valid value, got '{}'", key, raw)),
        None => Ok(default),
    }
}
