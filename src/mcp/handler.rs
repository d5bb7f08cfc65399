//! # MCP Handler Module
//!
//! Implements the Model Context Protocol surface of the server. Incoming
//! JSON-RPC requests are answered here and tool calls are routed to the
//! analytics dispatcher.
//!
//! ## Supported Tools
//!
//! - `get_dashboard_data` - Fetch a Footprint Network or Dune dashboard/chart
//!   URL and return its data as a JSON string

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::{
    analytics::dispatch::render,
    mcp::protocol::{error_codes, Request, Response, PROTOCOL_VERSION},
    utils, AppState,
};

pub const DASHBOARD_TOOL: &str = "get_dashboard_data";

// Tool results always carry a text block; `isError` tells clients the text is an error object.
fn make_tool_result(text: String, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error
    })
}

/// This is the main dispatcher for all incoming MCP requests.
pub async fn handle_mcp_request(req: Request, state: AppState) -> Option<Response> {
    info!("Handling MCP request for method: {}", req.method);

    if req.is_notification() {
        return None;
    }

    let response = match req.method.as_str() {
        "initialize" => handle_initialize(&req),
        "tools/list" => handle_tools_list(&req),
        "tools/call" => handle_tool_call(req, state).await,
        // Direct method call from CLI clients, reuses the tools/call path
        DASHBOARD_TOOL => handle_tool_call(req.into_tool_call(), state).await,
        _ => Response::error(
            req.id,
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ),
    };

    Some(response)
}

/// Handles a 'tools/call' request by dispatching it to the correct tool logic.
async fn handle_tool_call(req: Request, state: AppState) -> Response {
    let params = match req.params.as_ref() {
        Some(p) => p,
        None => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                "Missing 'params' object".into(),
            )
        }
    };

    let tool_name = match params.get("name").and_then(|n| n.as_str()) {
        Some(name) => name,
        None => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                "Missing 'name' field in params".into(),
            )
        }
    };

    let empty_args = json!({});
    let args = params.get("arguments").unwrap_or(&empty_args);
    let req_id = &req.id;

    match tool_name {
        DASHBOARD_TOOL => {
            let url = match utils::get_required_arg::<String>(args, "dashboard_url", req_id) {
                Ok(url) => url,
                Err(err_resp) => return err_resp,
            };
            let result = state.dispatcher.fetch(&url).await;
            let outcome = match &result {
                Ok(payload) => utils::describe_payload(payload),
                Err(e) => utils::describe_payload(&e.to_payload()),
            };
            debug!(url = %url, outcome = %outcome, "Tool call finished");
            let text = render(&result);
            Response::success(req_id.clone(), make_tool_result(text, result.is_err()))
        }
        _ => Response::error(
            req_id.clone(),
            error_codes::METHOD_NOT_FOUND,
            format!("Unknown tool: {}", tool_name),
        ),
    }
}

/// Handles the 'initialize' request.
fn handle_initialize(req: &Request) -> Response {
    let server_info = json!({
        "name": "analytics_mcp",
        "version": env!("CARGO_PKG_VERSION")
    });
    let capabilities = json!({ "tools": { "listChanged": false } });
    let instructions = "Retrieves raw chart data from Footprint Network and Dune dashboards. \
        Pass a dashboard, chart or query URL to get_dashboard_data.";

    Response::success(
        req.id.clone(),
        json!({
            "serverInfo": server_info,
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": capabilities,
            "instructions": instructions
        }),
    )
}

/// Handles the 'tools/list' request by returning a JSON definition of all available tools.
fn handle_tools_list(req: &Request) -> Response {
    let tools = json!([
        {
            "name": DASHBOARD_TOOL,
            "description": "Get raw data from a Footprint Network or Dune dashboard, chart or query and return it as a JSON string.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "dashboard_url": {
                        "type": "string",
                        "description": "Dashboard or chart URL, e.g. https://www.footprint.network/@Higi/Sui-Bridge or https://dune.com/hildobby/dex-metrics"
                    }
                },
                "required": ["dashboard_url"],
                "additionalProperties": false
            }
        }
    ]);
    Response::success(req.id.clone(), json!({ "tools": tools }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn state() -> AppState {
        AppState::new(Config::default(), None).unwrap()
    }

    fn request(method: &str, id: Value, params: Option<Value>) -> Request {
        Request {
            jsonrpc: "2.0".into(),
            id,
            method: method.into(),
            params,
        }
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let resp = handle_mcp_request(request("initialize", Value::Null, None), state()).await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_tools_list_exposes_dashboard_tool() {
        let resp = handle_mcp_request(request("tools/list", json!(1), None), state())
            .await
            .unwrap();
        let tools = resp.result.unwrap()["tools"].clone();
        assert_eq!(tools[0]["name"], DASHBOARD_TOOL);
        assert_eq!(tools[0]["inputSchema"]["required"][0], "dashboard_url");
    }

    #[tokio::test]
    async fn test_tool_call_unsupported_url_is_error_result() {
        let params = json!({"name": DASHBOARD_TOOL, "arguments": {"dashboard_url": "https://example.org/x"}});
        let resp = handle_mcp_request(request("tools/call", json!(2), Some(params)), state())
            .await
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        let text: Value = serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(text["kind"], "unsupported_url");
    }

    #[tokio::test]
    async fn test_direct_method_alias_requires_url() {
        let resp = handle_mcp_request(request(DASHBOARD_TOOL, json!(3), Some(json!({}))), state())
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let resp = handle_mcp_request(request("resources/list", json!(4), None), state())
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
    }
}
