use axum::{extract::State, response::IntoResponse, Json};

use crate::AppState;

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let proxy_pool = match &state.proxy_pool {
        Some(pool) => serde_json::to_value(pool.status().await).unwrap_or_default(),
        None => serde_json::json!({ "enabled": false }),
    };
    Json(serde_json::json!({ "status": "ok", "proxy_pool": proxy_pool }))
}
