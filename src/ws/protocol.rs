//! Wire message types for the WebSocket boundaries.
//!
//! Everything on the wire is JSON text frames, internally tagged with a
//! `type` field. Inbound identification is deserialized leniently: absent
//! `nom`/`numero`/`option` fields default rather than fail, matching the
//! no-validation contract of the registry.

use axum::extract::ws::Message;
use serde::Deserialize;

use crate::roster::{AdminEvent, Student, Track};

/// Messages a student connection may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Identify {
        #[serde(default)]
        nom: String,
        #[serde(default)]
        numero: String,
        #[serde(default)]
        option: Option<Track>,
    },
}

impl ClientMessage {
    /// Parse a text frame. `None` for frames that are not valid protocol
    /// messages; the caller logs and ignores those.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn into_student(self) -> Student {
        match self {
            ClientMessage::Identify {
                nom,
                numero,
                option,
            } => Student {
                nom,
                numero,
                option,
            },
        }
    }
}

/// Encode an admin event as a text frame.
pub fn encode_event(event: &AdminEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode admin event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_identify_message() {
        let msg = ClientMessage::parse(
            r#"{"type":"identify","nom":"Alice","numero":"123","option":"B1"}"#,
        )
        .expect("valid identify message");
        let student = msg.into_student();
        assert_eq!(student.nom, "Alice");
        assert_eq!(student.numero, "123");
        assert_eq!(student.option, Some(Track::B1));
    }

    #[test]
    fn missing_fields_default_instead_of_failing() {
        let msg = ClientMessage::parse(r#"{"type":"identify","nom":"Bob"}"#)
            .expect("partial identify message");
        let student = msg.into_student();
        assert_eq!(student.nom, "Bob");
        assert_eq!(student.numero, "");
        assert_eq!(student.option, None);
    }

    #[test]
    fn unknown_or_invalid_messages_are_rejected() {
        assert!(ClientMessage::parse("not json").is_none());
        assert!(ClientMessage::parse(r#"{"type":"shutdown"}"#).is_none());
        assert!(
            ClientMessage::parse(r#"{"type":"identify","option":"C9"}"#).is_none(),
            "unknown track value is not silently coerced"
        );
    }
}
