//! Small helpers shared by the MCP and HTTP front ends

use serde::de::DeserializeOwned;
use serde_json::{from_value, Value};

use crate::mcp::protocol::{error_codes, Response};

/// Pulls `key` out of a tool's arguments, or builds the INVALID_PARAMS response to send back
pub fn get_required_arg<T: DeserializeOwned>(
    args: &Value,
    key: &str,
    req_id: &Value,
) -> Result<T, Response> {
    from_value(args.get(key).cloned().unwrap_or(Value::Null)).map_err(|_| {
        Response::error(
            req_id.clone(),
            error_codes::INVALID_PARAMS,
            format!("Missing or invalid required argument: '{}'", key),
        )
    })
}

/// Short description of a payload for logs, without dumping the rows
pub fn describe_payload(payload: &Value) -> String {
    if let Some(charts) = payload.get("charts").and_then(Value::as_array) {
        format!("{} charts", charts.len())
    } else if let Some(rows) = payload.get("data").and_then(Value::as_array) {
        format!("{} rows", rows.len())
    } else if let Some(err) = payload.get("error").and_then(Value::as_str) {
        format!("error: {}", err)
    } else {
        "raw payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_arg_missing() {
        let resp = get_required_arg::<String>(&json!({}), "dashboard_url", &json!(7)).unwrap_err();
        let err = resp.error.unwrap();
        assert_eq!(err.code, error_codes::INVALID_PARAMS);
        assert!(err.message.contains("dashboard_url"));
    }

    #[test]
    fn test_describe_payload() {
        assert_eq!(describe_payload(&json!({"charts": [1, 2]})), "2 charts");
        assert_eq!(describe_payload(&json!({"data": []})), "0 rows");
        assert_eq!(describe_payload(&json!({"error": "No execution found"})), "error: No execution found");
    }
}
