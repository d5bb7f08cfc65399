// src/api/dashboard.rs

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::error;

use crate::{
    analytics::{ErrorKind, FetchError},
    AppState,
};

#[derive(Deserialize)]
pub struct DashboardQuery {
    pub url: String,
}

fn status_for(err: &FetchError) -> StatusCode {
    match err.kind() {
        ErrorKind::InvalidUrl | ErrorKind::UnsupportedUrl => StatusCode::BAD_REQUEST,
        ErrorKind::UpstreamUnavailable | ErrorKind::NoExecution | ErrorKind::NoChartData => {
            StatusCode::NOT_FOUND
        }
        ErrorKind::Http | ErrorKind::Decode => StatusCode::BAD_GATEWAY,
    }
}

pub async fn get_dashboard_handler(
    State(state): State<AppState>,
    Query(DashboardQuery { url }): Query<DashboardQuery>,
) -> impl IntoResponse {
    match state.dispatcher.fetch(&url).await {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(e) => {
            error!("Failed to fetch {}: {}", url, e);
            (status_for(&e), Json(e.to_payload())).into_response()
        }
    }
}
