//! Notification events parsed from queue messages.

use std::borrow::Cow;

use s3watcher_storage::RawMessage;
use serde::Deserialize;

use crate::error::ParseError;

/// Marker contained in every object-created event name.
const CREATE_MARKER: &str = "ObjectCreated";
/// Marker contained in every object-removed event name.
const REMOVE_MARKER: &str = "ObjectRemoved";

/// Lifecycle action carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventAction {
    Create,
    Delete,
}

impl EventAction {
    /// Classify an upstream event name such as `ObjectCreated:Put`.
    pub fn classify(event_name: &str) -> Result<Self, ParseError> {
        if event_name.contains(CREATE_MARKER) {
            Ok(EventAction::Create)
        } else if event_name.contains(REMOVE_MARKER) {
            Ok(EventAction::Delete)
        } else {
            Err(ParseError::UnrecognizedEvent(event_name.to_string()))
        }
    }
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::Create => write!(f, "CREATE"),
            EventAction::Delete => write!(f, "DELETE"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventBody {
    #[serde(rename = "Records")]
    records: Option<Vec<EventRecord>>,
}

#[derive(Debug, Deserialize)]
struct EventRecord {
    #[serde(rename = "eventName")]
    event_name: Option<String>,
    s3: Option<EventEntity>,
}

#[derive(Debug, Deserialize)]
struct EventEntity {
    object: Option<EventObject>,
}

#[derive(Debug, Deserialize)]
struct EventObject {
    key: Option<String>,
}

/// One validated storage-change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    message_id: String,
    ack_token: String,
    object_key: String,
    action: EventAction,
}

impl NotificationEvent {
    /// Validate a raw queue message.
    ///
    /// Only the first record of the body is considered. The object key is
    /// percent-decoded, with `+` read as a space.
    pub fn from_raw(message: &RawMessage) -> Result<Self, ParseError> {
        let message_id: &str = non_empty(message.message_id.as_deref())
            .ok_or(ParseError::MissingMessageId)?;
        let ack_token: &str =
            non_empty(message.ack_token.as_deref()).ok_or(ParseError::MissingAckToken)?;
        let body: &str = message.body.as_deref().ok_or(ParseError::MissingBody)?;

        let body: EventBody =
            serde_json::from_str(body).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
        let record: EventRecord = body
            .records
            .and_then(|records| records.into_iter().next())
            .ok_or(ParseError::MissingRecords)?;

        let raw_key: String = record
            .s3
            .and_then(|s3| s3.object)
            .and_then(|object| object.key)
            .filter(|key| !key.is_empty())
            .ok_or(ParseError::MissingKey)?;
        let object_key: String = decode_key(&raw_key)?;
        if object_key.is_empty() {
            return Err(ParseError::MissingKey);
        }

        let event_name: String = record
            .event_name
            .filter(|name| !name.is_empty())
            .ok_or(ParseError::MissingEventName)?;
        let action: EventAction = EventAction::classify(&event_name)?;

        Ok(Self {
            message_id: message_id.to_string(),
            ack_token: ack_token.to_string(),
            object_key,
            action,
        })
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn ack_token(&self) -> &str {
        &self.ack_token
    }

    /// Decoded object key.
    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    pub fn action(&self) -> EventAction {
        self.action
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Decode a key as it appears in bucket notifications.
pub fn decode_key(raw: &str) -> Result<String, ParseError> {
    let spaced: String = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(Cow::into_owned)
        .map_err(|_| ParseError::InvalidKeyEncoding {
            key: raw.to_string(),
        })
}
