/// Carries the session id in both directions. Lowercase so it can be used
/// directly as a static header name.
pub const HEADER_SESSION_ID: &str = "mcp-session-id";
pub const HEADER_X_ACCEL_BUFFERING: &str = "x-accel-buffering";
pub const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream";
pub const JSON_MIME_TYPE: &str = "application/json";
