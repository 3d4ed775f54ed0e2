//! The framed JSON message protocol spoken over each WebSocket.
//!
//! Every message carries a `type` field. Inbound `request_id`s are echoed
//! on the corresponding response; outbound messages are stamped with a
//! wall-clock timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use livescribe_ai::{DocumentSummary, Insight};

/// Client-initiated messages.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Question {
        content: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    /// `content` may be empty to clear the session intent.
    Intent { content: String },
    RecordingControl { content: RecordingControl },
    StatusRequest { content: String },
    /// Replaces the whole knowledge base with one document.
    UpdateKb { content: String },
    ListKbRecords,
    CreateKbRecord { content: String },
    UpdateKbRecord { doc_id: String, content: String },
    DeleteKbRecord { doc_id: String },
    GetKbRecord { doc_id: String },
    GetApiKeys,
    SetApiKeys {
        #[serde(default)]
        openai_key: String,
        #[serde(default)]
        gemini_key: String,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RecordingControl {
    pub action: RecordingAction,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RecordingAction {
    Start,
    Stop,
}

/// How an inbound frame failed to parse.
#[derive(Debug)]
pub enum ParseFailure {
    /// Not JSON at all.
    MalformedJson,
    /// JSON, but not a valid message; carries a description and whatever
    /// `request_id` could be recovered for the error reply.
    Invalid {
        description: String,
        request_id: Option<String>,
    },
}

/// Parses one wire frame. Failures keep the connection open; the caller
/// answers with a typed `error` message.
pub fn parse_inbound(raw: &str) -> Result<Inbound, ParseFailure> {
    let value: Value = serde_json::from_str(raw).map_err(|_| ParseFailure::MalformedJson)?;
    let request_id = value
        .get("request_id")
        .and_then(Value::as_str)
        .map(String::from);

    let message: Inbound = serde_json::from_value(value).map_err(|e| ParseFailure::Invalid {
        description: e.to_string(),
        request_id: request_id.clone(),
    })?;

    // Field-level validation beyond shape
    let invalid = match &message {
        Inbound::Question { content, .. } if content.trim().is_empty() => {
            Some("question content must not be empty".to_string())
        }
        Inbound::StatusRequest { content } if content != "recording_status" => {
            Some(format!("unknown status request: {content}"))
        }
        _ => None,
    };
    if let Some(description) = invalid {
        return Err(ParseFailure::Invalid {
            description,
            request_id,
        });
    }
    Ok(message)
}

#[derive(Clone, Debug, Serialize)]
pub struct TranscriptPayload {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub batch_id: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct InsightPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&Insight> for InsightPayload {
    fn from(insight: &Insight) -> Self {
        Self {
            kind: insight.kind.to_string(),
            content: insight.content.clone(),
            confidence: insight.confidence,
            timestamp: insight.timestamp,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct QuestionsPayload {
    pub questions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RecordingStatusPayload {
    pub recording: bool,
    pub timestamp: DateTime<Utc>,
}

/// Server-initiated messages, both direct replies and broadcasts.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Status {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
        request_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Transcript {
        content: TranscriptPayload,
    },
    Insight {
        content: InsightPayload,
    },
    SuggestedQuestions {
        content: QuestionsPayload,
    },
    Answer {
        question: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        confidence: f64,
        processing_time: f64,
        timestamp: DateTime<Utc>,
    },
    RecordingStatus {
        content: RecordingStatusPayload,
    },
    KbContent {
        content: String,
        timestamp: DateTime<Utc>,
    },
    KbUpdated {
        success: bool,
        message: String,
        timestamp: DateTime<Utc>,
    },
    KbRecordsList {
        records: Vec<DocumentSummary>,
        timestamp: DateTime<Utc>,
    },
    KbRecordCreated {
        success: bool,
        doc_id: String,
        title: String,
        timestamp: DateTime<Utc>,
    },
    KbRecordUpdated {
        success: bool,
        doc_id: String,
        timestamp: DateTime<Utc>,
    },
    KbRecordDeleted {
        success: bool,
        doc_id: String,
        timestamp: DateTime<Utc>,
    },
    KbRecordContent {
        doc_id: String,
        content: String,
        title: String,
        timestamp: DateTime<Utc>,
    },
    ApiKeys {
        openai_key: String,
        gemini_key: String,
        timestamp: DateTime<Utc>,
    },
    ApiKeysUpdated {
        success: bool,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl Outbound {
    pub fn status(message: impl Into<String>) -> Self {
        Outbound::Status {
            message: message.into(),
            session_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(error: impl Into<String>, request_id: Option<String>) -> Self {
        Outbound::Error {
            error: error.into(),
            request_id,
            timestamp: Utc::now(),
        }
    }

    pub fn recording_status(recording: bool) -> Self {
        Outbound::RecordingStatus {
            content: RecordingStatusPayload {
                recording,
                timestamp: Utc::now(),
            },
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","error":"serialization failure: {e}"}}"#)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ──────────────────────────────────────────────────────────
    // Inbound parsing
    // ──────────────────────────────────────────────────────────

    #[test]
    fn test_parse_question() {
        let message = parse_inbound(r#"{"type":"question","content":"what?","request_id":"r1"}"#)
            .unwrap();
        assert_eq!(
            message,
            Inbound::Question {
                content: "what?".to_string(),
                request_id: Some("r1".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_question_without_request_id() {
        let message = parse_inbound(r#"{"type":"question","content":"what?"}"#).unwrap();
        assert!(matches!(message, Inbound::Question { request_id: None, .. }));
    }

    #[test]
    fn test_empty_question_rejected_with_request_id() {
        let err = parse_inbound(r#"{"type":"question","content":"  ","request_id":"r2"}"#)
            .unwrap_err();
        match err {
            ParseFailure::Invalid { request_id, .. } => {
                assert_eq!(request_id.as_deref(), Some("r2"))
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_intent_allows_empty_content() {
        let message = parse_inbound(r#"{"type":"intent","content":""}"#).unwrap();
        assert_eq!(message, Inbound::Intent { content: String::new() });
    }

    #[test]
    fn test_parse_recording_control() {
        let message =
            parse_inbound(r#"{"type":"recording_control","content":{"action":"start"}}"#).unwrap();
        assert_eq!(
            message,
            Inbound::RecordingControl {
                content: RecordingControl {
                    action: RecordingAction::Start
                }
            }
        );
    }

    #[test]
    fn test_invalid_recording_action_rejected() {
        assert!(matches!(
            parse_inbound(r#"{"type":"recording_control","content":{"action":"pause"}}"#),
            Err(ParseFailure::Invalid { .. })
        ));
    }

    #[test]
    fn test_parse_status_request() {
        let message =
            parse_inbound(r#"{"type":"status_request","content":"recording_status"}"#).unwrap();
        assert_eq!(
            message,
            Inbound::StatusRequest {
                content: "recording_status".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_status_request_rejected() {
        assert!(matches!(
            parse_inbound(r#"{"type":"status_request","content":"weather"}"#),
            Err(ParseFailure::Invalid { .. })
        ));
    }

    #[test]
    fn test_parse_kb_messages() {
        assert_eq!(
            parse_inbound(r#"{"type":"list_kb_records"}"#).unwrap(),
            Inbound::ListKbRecords
        );
        assert!(matches!(
            parse_inbound(r##"{"type":"create_kb_record","content":"# Doc"}"##).unwrap(),
            Inbound::CreateKbRecord { .. }
        ));
        assert!(matches!(
            parse_inbound(r#"{"type":"update_kb_record","doc_id":"d1","content":"x"}"#).unwrap(),
            Inbound::UpdateKbRecord { .. }
        ));
        assert!(matches!(
            parse_inbound(r#"{"type":"delete_kb_record","doc_id":"d1"}"#).unwrap(),
            Inbound::DeleteKbRecord { .. }
        ));
        assert!(matches!(
            parse_inbound(r#"{"type":"get_kb_record","doc_id":"d1"}"#).unwrap(),
            Inbound::GetKbRecord { .. }
        ));
    }

    #[test]
    fn test_missing_required_field_rejected() {
        assert!(matches!(
            parse_inbound(r#"{"type":"update_kb_record","doc_id":"d1"}"#),
            Err(ParseFailure::Invalid { .. })
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(matches!(
            parse_inbound(r#"{"type":"telepathy"}"#),
            Err(ParseFailure::Invalid { .. })
        ));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            parse_inbound("{not json"),
            Err(ParseFailure::MalformedJson)
        ));
    }

    // ──────────────────────────────────────────────────────────
    // Outbound serialisation
    // ──────────────────────────────────────────────────────────

    #[test]
    fn test_outbound_carries_type_tag() {
        let json = Outbound::status("Connected").to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["message"], "Connected");
        assert!(value.get("timestamp").is_some());
        assert!(value.get("session_id").is_none(), "absent session_id omitted");
    }

    #[test]
    fn test_error_echoes_request_id() {
        let json = Outbound::error("boom", Some("r9".to_string())).to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["request_id"], "r9");
    }

    #[test]
    fn test_recording_status_shape() {
        let json = Outbound::recording_status(false).to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "recording_status");
        assert_eq!(value["content"]["recording"], false);
    }

    #[test]
    fn test_insight_payload_kind_renamed_to_type() {
        let payload = InsightPayload {
            kind: "summary".to_string(),
            content: "c".to_string(),
            confidence: 0.8,
            timestamp: Utc::now(),
        };
        let json = Outbound::Insight { content: payload }.to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["content"]["type"], "summary");
    }
}
