//! Protocol message definitions
//!
//! Defines the frames exchanged between helper/receiver clients and the relay.
//! Every frame is a single JSON object. Inbound frames are classified either by
//! a `role` field (registration) or by their `type` discriminator.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Role string declared by clients that supply screenshots
pub const ROLE_HELPER: &str = "helper";

/// Role string declared by clients that supply answers
pub const ROLE_RECEIVER: &str = "receiver";

// ============================================================================
// Error Types
// ============================================================================

/// Protocol-related errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Frame is not a JSON object")]
    NotAnObject,

    #[error("Invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

// ============================================================================
// Roles
// ============================================================================

/// Role a connection declares in its registration frame.
///
/// Unknown role strings are kept verbatim so that they can be logged and
/// looked up, but they never satisfy the helper/receiver gates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Helper,
    Receiver,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Helper => ROLE_HELPER,
            Role::Receiver => ROLE_RECEIVER,
            Role::Other(role) => role,
        }
    }

    /// Whether this is one of the two roles the relay routes for
    pub fn is_known(&self) -> bool {
        !matches!(self, Role::Other(_))
    }
}

impl From<&str> for Role {
    fn from(role: &str) -> Self {
        match role {
            ROLE_HELPER => Role::Helper,
            ROLE_RECEIVER => Role::Receiver,
            other => Role::Other(other.to_string()),
        }
    }
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        match role.as_str() {
            ROLE_HELPER => Role::Helper,
            ROLE_RECEIVER => Role::Receiver,
            _ => Role::Other(role),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Inbound Frames
// ============================================================================

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// `{ "role": ... }` handshake
    Register { role: Role },

    /// Screenshot captured by a helper
    Screenshot {
        question_id: String,
        screenshot: String,
    },

    /// Answer produced by a receiver
    Answer { question_id: String, answer: Value },

    /// Raw page markup, forwarded to receivers
    PageHtml { html: String },

    /// A frame with no role and a `type` the relay does not handle
    Unrecognized { kind: Option<String> },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScreenshotFields {
    #[serde(deserialize_with = "scalar_as_string")]
    question_id: String,
    screenshot: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerFields {
    #[serde(deserialize_with = "scalar_as_string")]
    question_id: String,
    answer: Value,
}

#[derive(Deserialize)]
struct PageHtmlFields {
    html: String,
}

impl InboundFrame {
    /// Parse and classify a frame from its JSON text
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Classify an already-parsed JSON value
    ///
    /// A truthy `role` field wins over any `type` field present in the same
    /// frame.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        let Value::Object(ref object) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        if let Some(role) = object.get("role").and_then(registration_role) {
            return Ok(InboundFrame::Register { role });
        }

        let kind = object.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("screenshot") => {
                let fields: ScreenshotFields = decode("screenshot", value)?;
                Ok(InboundFrame::Screenshot {
                    question_id: fields.question_id,
                    screenshot: fields.screenshot,
                })
            }
            Some("answer") => {
                let fields: AnswerFields = decode("answer", value)?;
                Ok(InboundFrame::Answer {
                    question_id: fields.question_id,
                    answer: fields.answer,
                })
            }
            Some("pageHTML") => {
                let fields: PageHtmlFields = decode("pageHTML", value)?;
                Ok(InboundFrame::PageHtml { html: fields.html })
            }
            _ => Ok(InboundFrame::Unrecognized { kind }),
        }
    }

    /// Short name used in log lines
    pub fn kind(&self) -> &str {
        match self {
            InboundFrame::Register { .. } => "register",
            InboundFrame::Screenshot { .. } => "screenshot",
            InboundFrame::Answer { .. } => "answer",
            InboundFrame::PageHtml { .. } => "pageHTML",
            InboundFrame::Unrecognized { kind } => kind.as_deref().unwrap_or("untyped"),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(kind: &'static str, value: Value) -> ProtocolResult<T> {
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

/// Question ids arrive as strings or numbers; keep either as text
fn scalar_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a string or number, found {}",
            other
        ))),
    }
}

/// Extract the declared role from a `role` field, treating empty and falsy
/// values as "no role". Non-string values are kept as their JSON text.
fn registration_role(value: &Value) -> Option<Role> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(Role::from(s.as_str())),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(Role::Other(other.to_string())),
    }
}

// ============================================================================
// Outbound Events
// ============================================================================

/// Events pushed from the relay to connected clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A screenshot arrived from a helper or the upload endpoint
    #[serde(rename = "new_screenshot", rename_all = "camelCase")]
    NewScreenshot {
        question_id: String,
        screenshot: String,
        timestamp: String,
    },

    /// An answer arrived from a receiver
    #[serde(rename = "answer", rename_all = "camelCase")]
    Answer {
        question_id: String,
        answer: Value,
        timestamp: String,
    },

    /// Page markup forwarded verbatim
    #[serde(rename = "pageHTML")]
    PageHtml { html: String, timestamp: String },
}

impl ServerEvent {
    /// Create a NewScreenshot event
    pub fn new_screenshot(
        question_id: impl Into<String>,
        screenshot: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        ServerEvent::NewScreenshot {
            question_id: question_id.into(),
            screenshot: screenshot.into(),
            timestamp: iso_timestamp(at),
        }
    }

    /// Create an Answer event
    pub fn answer(question_id: impl Into<String>, answer: Value, at: DateTime<Utc>) -> Self {
        ServerEvent::Answer {
            question_id: question_id.into(),
            answer,
            timestamp: iso_timestamp(at),
        }
    }

    /// Create a PageHtml event
    pub fn page_html(html: impl Into<String>, at: DateTime<Utc>) -> Self {
        ServerEvent::PageHtml {
            html: html.into(),
            timestamp: iso_timestamp(at),
        }
    }

    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::NewScreenshot { .. } => "new_screenshot",
            ServerEvent::Answer { .. } => "answer",
            ServerEvent::PageHtml { .. } => "pageHTML",
        }
    }

    /// Serialize the event to JSON
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Format a timestamp as ISO-8601 UTC with millisecond precision
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    // -------------------------------------------------------------------------
    // Inbound classification
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_registration() {
        let frame = InboundFrame::from_json(r#"{"role": "helper"}"#).unwrap();
        assert_eq!(frame, InboundFrame::Register { role: Role::Helper });

        let frame = InboundFrame::from_json(r#"{"role": "receiver"}"#).unwrap();
        assert_eq!(frame, InboundFrame::Register { role: Role::Receiver });
    }

    #[test]
    fn test_unknown_role_kept_verbatim() {
        let frame = InboundFrame::from_json(r#"{"role": "observer"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Register {
                role: Role::Other("observer".to_string())
            }
        );
    }

    #[test]
    fn test_role_takes_precedence_over_type() {
        let json = r#"{"role": "helper", "type": "screenshot", "questionId": "q1", "screenshot": "abc"}"#;
        let frame = InboundFrame::from_json(json).unwrap();
        assert_eq!(frame, InboundFrame::Register { role: Role::Helper });
    }

    #[test]
    fn test_falsy_role_falls_through_to_type() {
        let json = r#"{"role": "", "type": "pageHTML", "html": "<p>hi</p>"}"#;
        let frame = InboundFrame::from_json(json).unwrap();
        assert_eq!(
            frame,
            InboundFrame::PageHtml {
                html: "<p>hi</p>".to_string()
            }
        );

        let frame = InboundFrame::from_json(r#"{"role": null}"#).unwrap();
        assert_eq!(frame, InboundFrame::Unrecognized { kind: None });
    }

    #[test]
    fn test_non_string_role_is_other() {
        let frame = InboundFrame::from_json(r#"{"role": 7}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Register {
                role: Role::Other("7".to_string())
            }
        );
    }

    #[test]
    fn test_parse_screenshot() {
        let json = r#"{"type": "screenshot", "questionId": "q1", "screenshot": "abc"}"#;
        let frame = InboundFrame::from_json(json).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Screenshot {
                question_id: "q1".to_string(),
                screenshot: "abc".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_answer_with_structured_payload() {
        let json = r#"{"type": "answer", "questionId": "q1", "answer": {"choice": "B"}}"#;
        let frame = InboundFrame::from_json(json).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Answer {
                question_id: "q1".to_string(),
                answer: json!({"choice": "B"}),
            }
        );
    }

    #[test]
    fn test_screenshot_missing_fields() {
        let result = InboundFrame::from_json(r#"{"type": "screenshot", "questionId": "q1"}"#);
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidPayload {
                kind: "screenshot",
                ..
            })
        ));
    }

    #[test]
    fn test_numeric_question_id_kept_as_text() {
        let json = r#"{"type": "screenshot", "questionId": 42, "screenshot": "abc"}"#;
        let frame = InboundFrame::from_json(json).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Screenshot {
                question_id: "42".to_string(),
                screenshot: "abc".to_string(),
            }
        );

        let json = r#"{"type": "answer", "questionId": 7, "answer": "C"}"#;
        let frame = InboundFrame::from_json(json).unwrap();
        assert!(matches!(frame, InboundFrame::Answer { question_id, .. } if question_id == "7"));

        let json = r#"{"type": "answer", "questionId": {"id": 7}, "answer": "C"}"#;
        assert!(matches!(
            InboundFrame::from_json(json),
            Err(ProtocolError::InvalidPayload { kind: "answer", .. })
        ));
    }

    #[test]
    fn test_unknown_type_is_unrecognized() {
        let frame = InboundFrame::from_json(r#"{"type": "telemetry", "x": 1}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Unrecognized {
                kind: Some("telemetry".to_string())
            }
        );
        assert_eq!(frame.kind(), "telemetry");
    }

    #[test]
    fn test_malformed_json() {
        let result = InboundFrame::from_json("{not json");
        assert!(matches!(result, Err(ProtocolError::SerializationError(_))));
    }

    #[test]
    fn test_non_object_frame() {
        let result = InboundFrame::from_json("[1, 2, 3]");
        assert!(matches!(result, Err(ProtocolError::NotAnObject)));
    }

    // -------------------------------------------------------------------------
    // Outbound events
    // -------------------------------------------------------------------------

    #[test]
    fn test_new_screenshot_wire_shape() {
        let event = ServerEvent::new_screenshot("q1", "abc", fixed_time());
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "new_screenshot",
                "questionId": "q1",
                "screenshot": "abc",
                "timestamp": "2024-05-01T12:00:00.000Z",
            })
        );
    }

    #[test]
    fn test_answer_wire_shape() {
        let event = ServerEvent::answer("q9", json!("42"), fixed_time());
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "answer");
        assert_eq!(value["questionId"], "q9");
        assert_eq!(value["answer"], "42");
        assert_eq!(value["timestamp"], "2024-05-01T12:00:00.000Z");
    }

    #[test]
    fn test_page_html_wire_shape() {
        let event = ServerEvent::page_html("<html></html>", fixed_time());
        let json = event.to_json().unwrap();
        assert!(json.contains("\"type\":\"pageHTML\""));
        assert!(json.contains("\"html\":\"<html></html>\""));
        assert_eq!(event.kind(), "pageHTML");
    }

    #[test]
    fn test_iso_timestamp_millis() {
        let at = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap()
            + chrono::Duration::milliseconds(67);
        assert_eq!(iso_timestamp(at), "2023-01-02T03:04:05.067Z");
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Helper.to_string(), "helper");
        assert_eq!(Role::from("receiver"), Role::Receiver);
        assert!(!Role::from("admin").is_known());
    }
}
