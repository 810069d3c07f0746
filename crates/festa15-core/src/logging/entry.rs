//! The record shape for diagnostics files.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One diagnostics record.
///
/// Entries are self-contained JSON objects, one per line, so a file
/// stays readable after a truncated tail or interleaved appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    /// ISO 8601 timestamp with millisecond precision.
    pub ts: String,

    /// trace, debug, info, warn or error.
    pub level: String,

    /// Module path the record came from.
    pub target: String,

    /// Human-readable message.
    pub msg: String,

    /// Structured fields captured alongside the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,

    /// Span chain, root first, when the record fired inside spans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

impl DiagnosticEntry {
    /// New record stamped with the current time.
    pub fn new(
        level: impl Into<String>,
        target: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: level.into(),
            target: target.into(),
            msg: msg.into(),
            fields: None,
            span: None,
        }
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }

    /// Serialize to a single JSON line, no trailing newline.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serializes_to_one_line() {
        let entry = DiagnosticEntry::new("info", "festa15_core::engine", "session started");

        let json = entry.to_json_line().unwrap();
        assert!(!json.contains('\n'));
        assert!(json.contains("\"level\":\"info\""));
        assert!(json.contains("\"msg\":\"session started\""));

        let parsed = DiagnosticEntry::from_json_line(&json).unwrap();
        assert_eq!(parsed.target, "festa15_core::engine");
        assert_eq!(parsed.msg, "session started");
    }

    #[test]
    fn test_empty_optionals_are_omitted() {
        let entry = DiagnosticEntry::new("debug", "festa15_core::backend", "poll tick");
        let json = entry.to_json_line().unwrap();
        assert!(!json.contains("\"fields\""));
        assert!(!json.contains("\"span\""));
    }

    #[test]
    fn test_fields_survive_the_round_trip() {
        let entry = DiagnosticEntry::new("warn", "festa15_core::chat", "feed lagged")
            .with_fields(serde_json::json!({ "skipped": 3 }))
            .with_span("message_feed");

        let json = entry.to_json_line().unwrap();
        let parsed = DiagnosticEntry::from_json_line(&json).unwrap();
        assert_eq!(parsed.fields.unwrap()["skipped"], 3);
        assert_eq!(parsed.span.as_deref(), Some("message_feed"));
    }
}
