//! # API Module
//!
//! HTTP front end of the analytics MCP server.
//!
//! ## Available Endpoints
//!
//! - `GET /health` - Liveness plus proxy pool status
//! - `GET /dashboard?url=...` - Fetch a Footprint Network or Dune dashboard/chart
//! - `POST /rpc` - MCP JSON-RPC over HTTP

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub mod dashboard;
pub mod health;
pub mod rpc;

/// Routes mounted under `/api` by the server binary.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/dashboard", get(dashboard::get_dashboard_handler))
        .route("/rpc", post(rpc::rpc_handler))
}
