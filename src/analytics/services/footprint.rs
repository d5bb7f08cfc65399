// src/analytics/services/footprint.rs

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::analytics::models::{DashboardReference, FetchError, FetchResult, Provider};
use crate::config::Config;

const BASIC_INFO_TIMEOUT: Duration = Duration::from_secs(60);
const DATA_TIMEOUT: Duration = Duration::from_secs(120);
const CHART_TIMEOUT: Duration = Duration::from_secs(60);
const USER_AGENT: &str = "MCP-Footprint-Client";

/// Splits a Footprint query string into parameters.
///
/// Footprint writes dashboard filters as `a=1~b=2`; plain `a=1&b=2` is taken
/// too. Pairs without `=` are ignored.
pub fn parse_params(query: &str) -> BTreeMap<String, String> {
    if query.contains('~') && query.contains('&') {
        warn!(query, "Query string mixes '~' and '&' separators");
    }
    query
        .split(['~', '&'])
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// `https://www.footprint.network/@<user>/<dashboard>[?params][#type=dashboard]`
pub fn parse_dashboard_url(url: &str) -> FetchResult<DashboardReference> {
    let url = url.split("#type").next().unwrap_or(url);
    let (_, after_at) = url.split_once('@').ok_or_else(|| {
        FetchError::InvalidUrl(format!("Invalid Footprint dashboard URL: {}", url))
    })?;
    let path = after_at.split(['?', '#']).next().unwrap_or(after_at);
    let mut parts = path.split('/').filter(|p| !p.is_empty());
    let (owner, slug) = match (parts.next(), parts.next()) {
        (Some(user), Some(name)) => (user.to_string(), name.to_string()),
        _ => {
            return Err(FetchError::InvalidUrl(format!(
                "Invalid Footprint dashboard URL: {}",
                url
            )))
        }
    };

    let params = url
        .split_once('?')
        .map(|(_, rest)| parse_params(rest.split('#').next().unwrap_or(rest)))
        .unwrap_or_default();

    Ok(DashboardReference {
        provider: Provider::Footprint,
        owner,
        slug,
        params,
    })
}

/// Pulls the chart UUID out of a `...-fp-<uuid>` path segment.
pub fn parse_chart_url(url: &str) -> FetchResult<(Uuid, BTreeMap<String, String>)> {
    let (location, query) = match url.split_once('?') {
        Some((location, query)) => (location, Some(query)),
        None => (url, None),
    };
    let location = location.split('#').next().unwrap_or(location);
    let segment = location.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    let raw_id = segment
        .rsplit_once("fp-")
        .map(|(_, id)| id)
        .ok_or_else(|| FetchError::InvalidUrl(format!("No chart id in Footprint URL: {}", url)))?;
    let id = Uuid::parse_str(raw_id)
        .map_err(|e| FetchError::InvalidUrl(format!("Invalid Footprint chart id '{}': {}", raw_id, e)))?;

    let params = query
        .map(|q| parse_params(q.split('#').next().unwrap_or(q)))
        .unwrap_or_default();
    Ok((id, params))
}

/// Zips `data.cols[].display_name` with each row of `data.rows`.
pub fn rows_to_records(response: &Value) -> FetchResult<Vec<Value>> {
    let data = response
        .get("data")
        .ok_or_else(|| FetchError::Decode("Chart response has no 'data' field".into()))?;
    let columns: Vec<String> = data
        .get("cols")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Decode("Chart response has no column list".into()))?
        .iter()
        .map(|col| {
            col.get("display_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .collect();
    let rows = data
        .get("rows")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Decode("Chart response has no row list".into()))?;

    Ok(rows
        .iter()
        .map(|row| {
            let values = row.as_array().map(Vec::as_slice).unwrap_or_default();
            let record: Map<String, Value> = columns
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), values.get(i).cloned().unwrap_or(Value::Null)))
                .collect();
            Value::Object(record)
        })
        .collect())
}

/// Client for the public Footprint Network dashboard and chart endpoints.
#[derive(Clone)]
pub struct FootprintClient {
    client: Client,
    api_base: String,
    data_api_url: String,
}

impl FootprintClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build Footprint HTTP client")?;
        Ok(Self {
            client,
            api_base: config.footprint_api_base.trim_end_matches('/').to_string(),
            data_api_url: config.footprint_data_api_url.clone(),
        })
    }

    /// Resolves the public UUID behind `@username/dashboard-name`.
    pub async fn dashboard_uuid(&self, username: &str, dashboard_name: &str) -> FetchResult<String> {
        let url = format!("{}/dashboard/basic", self.api_base);
        let payload = json!({
            "dashboardName": dashboard_name,
            "userName": username,
        });
        debug!(username, dashboard_name, "Resolving Footprint dashboard UUID");

        let data: Value = self
            .client
            .post(&url)
            .timeout(BASIC_INFO_TIMEOUT)
            .header("accept", "application/json, text/plain, */*")
            .header("client_request_time", chrono::Utc::now().timestamp_millis().to_string())
            .header("origin", "https://www.footprint.network")
            .header(
                "referer",
                format!("https://www.footprint.network/@{}/{}", username, dashboard_name),
            )
            .json(&payload)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::http("HTTP error fetching dashboard UUID", e))?
            .json()
            .await
            .map_err(|e| FetchError::http("Failed to get dashboard UUID", e))?;

        data.pointer("/data/uuid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                FetchError::Decode("Failed to get dashboard UUID: response has no data.uuid".into())
            })
    }

    /// All chart results of one public dashboard in a single call.
    pub async fn charts_data(
        &self,
        dashboard_uuid: &str,
        params: &BTreeMap<String, String>,
    ) -> FetchResult<Vec<Value>> {
        // `paramters` is how the endpoint spells it.
        let payload = json!({
            "publicUuid": dashboard_uuid,
            "dashboardId": "",
            "paramters": params,
        });

        let data: Value = self
            .client
            .post(&self.data_api_url)
            .timeout(DATA_TIMEOUT)
            .header("X-Fastest-App", "richer")
            .json(&payload)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::http("HTTP error fetching chart data", e))?
            .json()
            .await
            .map_err(|e| FetchError::http("Failed to get chart data", e))?;

        Ok(data
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// `{"charts": [...]}` for a dashboard URL.
    pub async fn fetch_dashboard(&self, url: &str) -> FetchResult<Value> {
        let reference = parse_dashboard_url(url)?;
        let uuid = self.dashboard_uuid(&reference.owner, &reference.slug).await?;
        let charts = self.charts_data(&uuid, &reference.params).await?;
        info!(
            username = %reference.owner,
            dashboard = %reference.slug,
            charts = charts.len(),
            "Fetched Footprint dashboard"
        );
        Ok(json!({ "charts": charts }))
    }

    /// `{"data": [...]}` for a single chart URL, one record per row.
    pub async fn fetch_chart(&self, url: &str) -> FetchResult<Value> {
        let (chart_id, params) = parse_chart_url(url)?;
        let mut endpoint = Url::parse(&format!("{}/public/card/{}/query", self.api_base, chart_id))
            .map_err(|e| FetchError::InvalidUrl(format!("Bad Footprint API base: {}", e)))?;
        if !params.is_empty() {
            endpoint.query_pairs_mut().extend_pairs(params.iter());
        }

        let response: Value = self
            .client
            .get(endpoint)
            .timeout(CHART_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::http("HTTP error fetching chart", e))?
            .json()
            .await
            .map_err(|e| FetchError::http("Failed to parse chart response", e))?;

        let records = rows_to_records(&response)?;
        debug!(%chart_id, rows = records.len(), "Fetched Footprint chart");
        Ok(json!({ "data": records }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_trims_api_base() {
        let mut config = Config::default();
        config.footprint_api_base = "http://127.0.0.1:9/api/v1/".into();
        let client = FootprintClient::new(&config).unwrap();
        assert_eq!(client.api_base, "http://127.0.0.1:9/api/v1");
    }

    #[test]
    fn test_dashboard_url_drops_type_fragment() {
        let reference =
            parse_dashboard_url("https://www.footprint.network/@Traevon/Pixels-Mockup#type=dashboard")
                .unwrap();
        assert_eq!(reference.owner, "Traevon");
        assert_eq!(reference.slug, "Pixels-Mockup");
        assert!(reference.params.is_empty());
    }

    #[test]
    fn test_dashboard_url_with_tilde_params() {
        let reference = parse_dashboard_url(
            "https://www.footprint.network/@Higi/Sui-Bridge?date_range=past30days~chain=Sui#type=dashboard",
        )
        .unwrap();
        assert_eq!(reference.slug, "Sui-Bridge");
        assert_eq!(reference.params.get("date_range").map(String::as_str), Some("past30days"));
        assert_eq!(reference.params.get("chain").map(String::as_str), Some("Sui"));
    }

    #[test]
    fn test_params_accept_ampersand() {
        let params = parse_params("a=1&b=2&flag");
        assert_eq!(params.len(), 2);
        assert_eq!(params["b"], "2");
    }

    #[test]
    fn test_dashboard_url_without_at_is_invalid() {
        let err = parse_dashboard_url("https://www.footprint.network/dashboards").unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[test]
    fn test_chart_uuid_extraction() {
        let (id, params) = parse_chart_url(
            "https://www.footprint.network/guest/chart/Total-Pet-Minted-fp-e9135cea-f9cd-4c59-8371-b3078c9b1bbe",
        )
        .unwrap();
        assert_eq!(id.to_string(), "e9135cea-f9cd-4c59-8371-b3078c9b1bbe");
        assert!(params.is_empty());
    }

    #[test]
    fn test_chart_url_params() {
        let (_, params) = parse_chart_url(
            "https://www.footprint.network/chart/Volume-fp-e9135cea-f9cd-4c59-8371-b3078c9b1bbe?chain=Ethereum&days=7",
        )
        .unwrap();
        assert_eq!(params["chain"], "Ethereum");
        assert_eq!(params["days"], "7");
    }

    #[test]
    fn test_chart_url_without_id() {
        assert!(parse_chart_url("https://www.footprint.network/guest/chart/Total").is_err());
    }

    #[test]
    fn test_rows_to_records_keeps_column_and_row_order() {
        let response = json!({
            "data": {
                "cols": [{"display_name": "day"}, {"display_name": "minted"}],
                "rows": [["2024-01-02", 5], ["2024-01-01", 3], ["2023-12-31"]]
            }
        });
        let records = rows_to_records(&response).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["day"], "2024-01-02");
        assert_eq!(records[1]["minted"], 3);
        assert!(records[2]["minted"].is_null());
        let keys: Vec<&String> = records[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["day", "minted"]);
    }
}
