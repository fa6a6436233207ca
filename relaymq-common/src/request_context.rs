use serde::{Deserialize, Serialize};
use tracing::Span;

/// Parameters of the client request a dispatch pipeline serves. The HTTP
/// layer materializes one per request; components record it into their
/// worker spans so every log line of the pipeline carries the triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParam {
    /// Request ID assigned at the HTTP edge
    pub id: String,
    /// Request method: DELETE, POST, PUT, GET, etc.
    pub method: String,
    /// Request URI
    pub uri: String,
}

impl RequestParam {
    /// Fill the `request_id` / `request_method` / `request_uri` fields a
    /// span declared empty.
    pub fn record(&self, span: &Span) {
        span.record("request_id", self.id.as_str());
        span.record("request_method", self.method.as_str());
        span.record("request_uri", self.uri.as_str());
    }
}

#[cfg(test)]
#[path = "request_context_test.rs"]
mod tests;
