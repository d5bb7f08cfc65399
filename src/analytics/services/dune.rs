// src/analytics/services/dune.rs

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::analytics::models::{
    object_keys, AggregatedDashboardResult, ChartEntry, ChartResult, DashboardRecord,
    DashboardReference, ExecutionHandle, FetchError, FetchResult, Provider, QueryParameter,
    VisualizationWidget,
};
use crate::analytics::transport::{DuneTransport, EXECUTION_TIMEOUT};
use crate::config::Config;

/// Upper bound on rows pulled per execution.
pub const SAMPLE_ROW_CAP: u64 = 8000;

pub const INVALID_DASHBOARD_URL: &str = "Invalid Dune dashboard URL format";
pub const INVALID_QUERY_URL: &str = "Invalid Dune query URL format";
pub const DASHBOARD_UNAVAILABLE: &str = "Dashboard not found or access denied by Cloudflare.";

const FIND_DASHBOARD_OPERATION: &str = "FindDashboard";
const FIND_DASHBOARD_QUERY: &str = r#"query FindDashboard($filters: DashboardFilterInput!) {
  dashboards(filters: $filters, pagination: { first: 1 }) {
    edges {
      node {
        id
        name
        slug
        user { name handle }
        team { name handle }
        visualization_widgets {
          id
          visualization {
            id
            type
            name
            options
            query_details { query_id name parameters }
          }
        }
      }
    }
  }
}"#;

const LATEST_RESULT_OPERATION: &str = "GetLatestResultSetIds";
const LATEST_RESULT_QUERY: &str = r#"query GetLatestResultSetIds($query_id: Int!, $parameters: [Parameter!], $can_refresh: Boolean!) {
  resultSetForQuery(query_id: $query_id, parameters: $parameters, can_refresh: $can_refresh) {
    completed_execution_id
    failed_execution_id
    pending_execution_ids
  }
}"#;

/// `https://dune.com/<handle>/<slug>`; any other segment count is rejected.
pub fn parse_dashboard_url(url: &str) -> FetchResult<DashboardReference> {
    let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(INVALID_DASHBOARD_URL.into()))?;
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    if segments.len() != 2 {
        return Err(FetchError::InvalidUrl(INVALID_DASHBOARD_URL.into()));
    }
    let params: BTreeMap<String, String> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    Ok(DashboardReference {
        provider: Provider::Dune,
        owner: segments[0].to_string(),
        slug: segments[1].to_string(),
        params,
    })
}

/// `https://dune.com/queries/<id>[/<visualization>]`
pub fn parse_query_url(url: &str) -> FetchResult<i64> {
    let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(INVALID_QUERY_URL.into()))?;
    parsed
        .path_segments()
        .and_then(|mut s| s.nth(1))
        .and_then(|id| id.parse::<i64>().ok())
        .ok_or_else(|| FetchError::InvalidUrl(INVALID_QUERY_URL.into()))
}

/// Visualization options arrive either as an object or as a JSON string.
/// Anything undecodable becomes an empty object.
pub fn decode_options(options: &Value) -> Value {
    match options {
        Value::Object(_) => options.clone(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(decoded @ Value::Object(_)) => decoded,
            _ => {
                debug!("Visualization options were not decodable, using empty options");
                Value::Object(Map::new())
            }
        },
        _ => Value::Object(Map::new()),
    }
}

/// Column names charted by a visualization, in the order the options list them.
pub fn output_columns(options: &Value) -> Vec<String> {
    options
        .get("columnMapping")
        .map(object_keys)
        .unwrap_or_default()
}

/// Values from the dashboard URL override defaults of parameters with the same key.
pub fn apply_overrides(
    parameters: &[QueryParameter],
    overrides: &BTreeMap<String, String>,
) -> Vec<QueryParameter> {
    parameters
        .iter()
        .map(|param| match overrides.get(&param.key) {
            Some(value) => QueryParameter {
                value: Value::String(value.clone()),
                ..param.clone()
            },
            None => param.clone(),
        })
        .collect()
}

fn first_dashboard_node(response: &Value) -> Option<&Value> {
    response
        .pointer("/data/dashboards/edges")
        .and_then(Value::as_array)
        .and_then(|edges| edges.first())
        .and_then(|edge| edge.get("node"))
}

/// Dune dashboards and queries, read through the session-replaying transport.
#[derive(Clone)]
pub struct DuneClient {
    transport: DuneTransport,
    execution_url: String,
}

impl DuneClient {
    pub fn new(config: &Config, transport: DuneTransport) -> Self {
        Self {
            transport,
            execution_url: config.dune_execution_url.clone(),
        }
    }

    /// Dashboard metadata by exact handle and slug.
    pub async fn find_dashboard(&self, handle: &str, slug: &str) -> FetchResult<DashboardRecord> {
        let variables = json!({
            "filters": {
                "slug": { "equals": slug },
                "handle": { "equals": handle },
            }
        });
        let response = self
            .transport
            .graphql(FIND_DASHBOARD_OPERATION, FIND_DASHBOARD_QUERY, variables)
            .await
            .ok_or_else(|| FetchError::upstream(DASHBOARD_UNAVAILABLE))?;

        let node = first_dashboard_node(&response).ok_or_else(|| {
            FetchError::UpstreamUnavailable {
                message: DASHBOARD_UNAVAILABLE.into(),
                status: None,
                body: Some(response.to_string()),
            }
        })?;
        serde_json::from_value(node.clone())
            .map_err(|e| FetchError::Decode(format!("Unexpected dashboard shape: {}", e)))
    }

    /// Latest completed execution of a query, letting Dune refresh it if it can.
    /// `None` covers both "never ran" and an unreachable upstream.
    pub async fn resolve_execution(
        &self,
        query_id: i64,
        parameters: &[QueryParameter],
    ) -> Option<ExecutionHandle> {
        let variables = json!({
            "query_id": query_id,
            "parameters": parameters,
            "can_refresh": true,
        });
        let response = self
            .transport
            .graphql(LATEST_RESULT_OPERATION, LATEST_RESULT_QUERY, variables)
            .await?;
        let execution_id = response
            .pointer("/data/resultSetForQuery/completed_execution_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())?;
        Some(ExecutionHandle {
            query_id,
            parameters: parameters.to_vec(),
            execution_id: execution_id.to_string(),
        })
    }

    /// Rows of one execution, capped at `SAMPLE_ROW_CAP`.
    pub async fn fetch_execution(
        &self,
        handle: &ExecutionHandle,
        columns: &[String],
    ) -> Option<Value> {
        let mut body = json!({
            "execution_id": handle.execution_id,
            "query_id": handle.query_id,
            "parameters": handle.parameters,
            "sampling": { "count": SAMPLE_ROW_CAP },
        });
        if !columns.is_empty() {
            body["columns"] = json!(columns);
        }
        self.transport
            .post_json(&self.execution_url, &body, EXECUTION_TIMEOUT)
            .await
    }

    async fn process_widget(
        &self,
        raw: &Value,
        overrides: &BTreeMap<String, String>,
    ) -> Option<ChartEntry> {
        let widget = match VisualizationWidget::from_value(raw) {
            Ok(widget) => widget,
            Err(e) => {
                debug!(error = %e, "Undecodable widget, skipping visualization");
                return None;
            }
        };
        let visualization = widget.visualization.as_ref()?;
        // Text and image widgets carry no query.
        let details = visualization.query_details.as_ref()?;
        let options = decode_options(&visualization.options);
        let columns = output_columns(&options);
        let parameters = apply_overrides(&details.parameters, overrides);

        let Some(handle) = self.resolve_execution(details.query_id, &parameters).await else {
            debug!(
                widget_id = widget.id,
                query_id = details.query_id,
                "No completed execution, skipping visualization"
            );
            return None;
        };

        let result = match self.fetch_execution(&handle, &columns).await {
            Some(response) => ChartResult::from_execution_response(&response),
            None => {
                warn!(
                    query_id = handle.query_id,
                    execution_id = %handle.execution_id,
                    "Execution fetch failed, keeping visualization without rows"
                );
                None
            }
        };

        Some(ChartEntry {
            widget_id: widget.id,
            visualization_id: visualization.id,
            visualization_type: visualization.kind.clone(),
            visualization_name: visualization.name.clone(),
            query_id: details.query_id,
            query_name: details.name.clone(),
            execution_id: handle.execution_id,
            output_columns: columns,
            result,
        })
    }

    /// Every chart of a dashboard, visualizations handled one at a time in listed order.
    pub async fn fetch_dashboard(&self, url: &str) -> FetchResult<Value> {
        let reference = parse_dashboard_url(url)?;
        let record = self.find_dashboard(&reference.owner, &reference.slug).await?;
        info!(
            dashboard = %record.slug,
            widgets = record.visualization_widgets.len(),
            "Resolved Dune dashboard"
        );

        let mut charts = Vec::new();
        for raw in &record.visualization_widgets {
            if let Some(entry) = self.process_widget(raw, &reference.params).await {
                charts.push(entry);
            }
        }

        let aggregated = AggregatedDashboardResult {
            dashboard_name: record.name.clone(),
            slug: record.slug.clone(),
            id: record.id,
            owner: record.owner_name(),
            charts,
        };
        serde_json::to_value(&aggregated)
            .map_err(|e| FetchError::Decode(format!("Failed to encode dashboard result: {}", e)))
    }

    /// Raw execution-fetch response for a single query URL.
    pub async fn fetch_query(&self, url: &str) -> FetchResult<Value> {
        let query_id = parse_query_url(url)?;
        let handle = self
            .resolve_execution(query_id, &[])
            .await
            .ok_or(FetchError::NoExecution)?;
        self.fetch_execution(&handle, &[])
            .await
            .ok_or(FetchError::NoChartData)
    }
}
