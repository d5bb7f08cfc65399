// src/analytics/models.rs
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

// --- Error types for dashboard fetching ---

/// Coarse classification of a failed fetch, surfaced to callers next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    UnsupportedUrl,
    Http,
    UpstreamUnavailable,
    NoExecution,
    NoChartData,
    Decode,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::UnsupportedUrl => "unsupported_url",
            ErrorKind::Http => "http",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::NoExecution => "no_execution",
            ErrorKind::NoChartData => "no_chart_data",
            ErrorKind::Decode => "decode",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{0}")]
    InvalidUrl(String),
    #[error("Unsupported URL. Only Footprint Network and Dune dashboard or chart URLs are supported.")]
    UnsupportedUrl,
    #[error("{context}: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },
    /// Not found and blocked look the same upstream; the raw response is kept for diagnostics.
    #[error("{message}")]
    UpstreamUnavailable {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },
    #[error("No execution found")]
    NoExecution,
    #[error("No chart data found")]
    NoChartData,
    #[error("{0}")]
    Decode(String),
}

impl FetchError {
    pub fn http(context: impl Into<String>, source: reqwest::Error) -> Self {
        FetchError::Http {
            context: context.into(),
            source,
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        FetchError::UpstreamUnavailable {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            FetchError::UnsupportedUrl => ErrorKind::UnsupportedUrl,
            FetchError::Http { .. } => ErrorKind::Http,
            FetchError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            FetchError::NoExecution => ErrorKind::NoExecution,
            FetchError::NoChartData => ErrorKind::NoChartData,
            FetchError::Decode(_) => ErrorKind::Decode,
        }
    }

    /// The JSON object handed back across the tool boundary.
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        if let FetchError::UpstreamUnavailable { status, body, .. } = self {
            if status.is_some() || body.is_some() {
                payload["upstream"] = json!({ "status": status, "body": body });
            }
        }
        payload
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

// --- Request-scoped data model ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Footprint,
    Dune,
}

/// Identifies one dashboard on one provider. Built once from the input URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardReference {
    pub provider: Provider,
    /// Footprint username or Dune handle
    pub owner: String,
    /// Footprint dashboard name or Dune slug
    pub slug: String,
    pub params: BTreeMap<String, String>,
}

/// A Dune query parameter as the GraphQL and execution endpoints expect it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub key: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryDetails {
    pub query_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: Vec<QueryParameter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Visualization {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Either an object or a JSON document encoded as a string.
    #[serde(default)]
    pub options: Value,
    pub query_details: Option<QueryDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisualizationWidget {
    pub id: i64,
    pub visualization: Option<Visualization>,
}

impl VisualizationWidget {
    pub fn from_value(raw: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(raw.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardRecord {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub user: Option<Owner>,
    #[serde(default)]
    pub team: Option<Owner>,
    /// Kept raw so one oddly shaped widget cannot fail the whole dashboard.
    #[serde(default)]
    pub visualization_widgets: Vec<Value>,
}

impl DashboardRecord {
    /// Team dashboards report the team, personal ones the user.
    pub fn owner_name(&self) -> Option<String> {
        self.user
            .as_ref()
            .or(self.team.as_ref())
            .and_then(|o| o.name.clone().or_else(|| o.handle.clone()))
    }
}

/// A query run resolved to the execution whose rows can be fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionHandle {
    pub query_id: i64,
    pub parameters: Vec<QueryParameter>,
    pub execution_id: String,
}

/// Rows of one succeeded execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartResult {
    pub columns: Vec<String>,
    pub column_metadata: Value,
    pub data: Vec<Value>,
    pub total_row_count: u64,
}

impl ChartResult {
    /// Reads the `execution_succeeded` block of an execution-fetch response.
    pub fn from_execution_response(response: &Value) -> Option<Self> {
        let succeeded = response.get("execution_succeeded")?;
        let columns = succeeded
            .get("columns")
            .and_then(Value::as_array)
            .map(|cols| {
                cols.iter()
                    .filter_map(|c| c.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let data = succeeded
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let total_row_count = succeeded
            .get("total_row_count")
            .and_then(Value::as_u64)
            .unwrap_or(data.len() as u64);
        Some(ChartResult {
            columns,
            column_metadata: succeeded
                .get("columns_metadata")
                .or_else(|| succeeded.get("column_metadata"))
                .cloned()
                .unwrap_or(Value::Null),
            data,
            total_row_count,
        })
    }
}

/// One visualization in the aggregated dashboard output.
#[derive(Debug, Clone, Serialize)]
pub struct ChartEntry {
    pub widget_id: i64,
    pub visualization_id: i64,
    pub visualization_type: Option<String>,
    pub visualization_name: Option<String>,
    pub query_id: i64,
    pub query_name: Option<String>,
    pub execution_id: String,
    pub output_columns: Vec<String>,
    #[serde(flatten)]
    pub result: Option<ChartResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatedDashboardResult {
    pub dashboard_name: String,
    pub slug: String,
    pub id: i64,
    pub owner: Option<String>,
    pub charts: Vec<ChartEntry>,
}

/// Keeps object key order; used where upstream order is meaningful.
pub fn object_keys(value: &Value) -> Vec<String> {
    value
        .as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_result_from_succeeded_response() {
        let response = json!({
            "execution_succeeded": {
                "columns": ["day", "volume"],
                "columns_metadata": [{"name": "day", "type": "timestamp"}],
                "data": [{"day": "2024-01-01", "volume": 12}],
                "total_row_count": 40
            }
        });
        let result = ChartResult::from_execution_response(&response).unwrap();
        assert_eq!(result.columns, vec!["day", "volume"]);
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.total_row_count, 40);
        assert!(result.column_metadata.is_array());
    }

    #[test]
    fn test_chart_result_absent_without_success_block() {
        let response = json!({"execution_failed": {"reason": "timeout"}});
        assert!(ChartResult::from_execution_response(&response).is_none());
    }

    #[test]
    fn test_error_payload_keeps_exact_message() {
        let err = FetchError::InvalidUrl("Invalid Dune dashboard URL format".into());
        let payload = err.to_payload();
        assert_eq!(payload["error"], "Invalid Dune dashboard URL format");
        assert_eq!(payload["kind"], "invalid_url");
    }

    #[test]
    fn test_upstream_payload_carries_diagnostics() {
        let err = FetchError::UpstreamUnavailable {
            message: "Dashboard not found or access denied by Cloudflare.".into(),
            status: Some(403),
            body: Some("<html>".into()),
        };
        let payload = err.to_payload();
        assert_eq!(payload["upstream"]["status"], 403);
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    }

    #[test]
    fn test_owner_prefers_user_then_team() {
        let record: DashboardRecord = serde_json::from_value(json!({
            "id": 1, "name": "DEX", "slug": "dex",
            "user": null,
            "team": {"name": "Hildobby Team", "handle": "hildobby"}
        }))
        .unwrap();
        assert_eq!(record.owner_name().as_deref(), Some("Hildobby Team"));
    }

    #[test]
    fn test_malformed_widget_only_fails_itself() {
        let record: DashboardRecord = serde_json::from_value(json!({
            "id": 1, "name": "DEX", "slug": "dex",
            "visualization_widgets": [
                {"id": 1, "visualization": {"id": 10, "query_details": {"query_id": 5, "parameters": []}}},
                {"id": 2, "visualization": {"id": 11, "query_details": {"query_id": null}}}
            ]
        }))
        .unwrap();
        assert_eq!(record.visualization_widgets.len(), 2);
        assert!(VisualizationWidget::from_value(&record.visualization_widgets[0]).is_ok());
        assert!(VisualizationWidget::from_value(&record.visualization_widgets[1]).is_err());
    }

    #[test]
    fn test_object_keys_preserve_order() {
        let v: Value = serde_json::from_str(r#"{"zeta": {}, "alpha": {}, "mid": {}}"#).unwrap();
        assert_eq!(object_keys(&v), vec!["zeta", "alpha", "mid"]);
    }
}
