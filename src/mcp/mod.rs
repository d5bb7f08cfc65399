// MCP front end: JSON-RPC framing and the tool dispatcher
pub mod handler;
pub mod protocol;
