//! # Event Envelopes
//!
//! The outbox stores an envelope `{eventName, payload}`; the wire carries
//! the same envelope plus the outbox id as `eventId`. Payloads are a tagged
//! sum over the known event names so consumers get typed access, while the
//! dispatcher treats the stored JSON as opaque and can drain event kinds it
//! has never heard of.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Routing key of the task-created event.
pub const TASK_CREATED_EVENT: &str = "task.created.event";

/// Payload of `task.created.event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreatedPayload {
    pub task_id: Uuid,
    pub file_path: String,
    pub original_file_name: String,
}

/// Envelope stored in the outbox `event` column.
///
/// Serializes to exactly `{"eventName": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventName", content = "payload")]
pub enum EventEnvelope {
    #[serde(rename = "task.created.event")]
    TaskCreated(TaskCreatedPayload),
}

impl EventEnvelope {
    pub fn event_name(&self) -> &'static str {
        match self {
            EventEnvelope::TaskCreated(_) => TASK_CREATED_EVENT,
        }
    }
}

/// Why an inbound bus message could not be handled.
///
/// Every variant is a permanent condition: the consumer acks and drops
/// rather than cycling the message through the retry topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRejection {
    Malformed(String),
    MissingEventId,
    MissingPayload,
    UnknownEventName(String),
}

impl std::fmt::Display for MessageRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRejection::Malformed(detail) => write!(f, "malformed message: {detail}"),
            MessageRejection::MissingEventId => write!(f, "message has no eventId"),
            MessageRejection::MissingPayload => write!(f, "message has no payload"),
            MessageRejection::UnknownEventName(name) => write!(f, "unknown event name: {name}"),
        }
    }
}

/// A fully parsed `task.created.event` bus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEventMessage {
    pub event_id: Uuid,
    pub payload: TaskCreatedPayload,
}

impl TaskEventMessage {
    /// Parse an inbound delivery body.
    ///
    /// Field checks run before payload typing so the log line can say which
    /// contract piece was violated.
    pub fn from_bytes(body: &[u8]) -> Result<Self, MessageRejection> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| MessageRejection::Malformed(e.to_string()))?;

        let event_id = value
            .get("eventId")
            .and_then(|v| v.as_str())
            .ok_or(MessageRejection::MissingEventId)?;
        let event_id = Uuid::parse_str(event_id).map_err(|_| MessageRejection::MissingEventId)?;

        let event_name = value
            .get("eventName")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let payload_value = value
            .get("payload")
            .filter(|v| !v.is_null())
            .ok_or(MessageRejection::MissingPayload)?;

        if event_name != TASK_CREATED_EVENT {
            return Err(MessageRejection::UnknownEventName(event_name));
        }

        let payload: TaskCreatedPayload = serde_json::from_value(payload_value.clone())
            .map_err(|e| MessageRejection::Malformed(e.to_string()))?;

        Ok(Self { event_id, payload })
    }
}

/// Build the wire body for an outbox event: the stored envelope with the
/// outbox id spliced in as `eventId`.
pub fn wire_body(event_id: Uuid, stored_envelope: &serde_json::Value) -> serde_json::Value {
    let mut body = match stored_envelope {
        serde_json::Value::Object(map) => map.clone(),
        other => {
            // A non-object envelope only happens with hand-edited rows;
            // wrap it so the message is still traceable.
            let mut map = serde_json::Map::new();
            map.insert("payload".to_string(), other.clone());
            map
        }
    };
    body.insert(
        "eventId".to_string(),
        serde_json::Value::String(event_id.to_string()),
    );
    serde_json::Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope() -> EventEnvelope {
        EventEnvelope::TaskCreated(TaskCreatedPayload {
            task_id: Uuid::parse_str("6f1c7a70-9a67-4be3-8a61-53e4ef4e2f0a").unwrap(),
            file_path: "uploads/abc/reservations.xlsx".to_string(),
            original_file_name: "reservations.xlsx".to_string(),
        })
    }

    #[test]
    fn test_envelope_wire_shape() {
        let json = serde_json::to_value(sample_envelope()).unwrap();
        assert_eq!(json["eventName"], "task.created.event");
        assert_eq!(
            json["payload"]["taskId"],
            "6f1c7a70-9a67-4be3-8a61-53e4ef4e2f0a"
        );
        assert_eq!(json["payload"]["filePath"], "uploads/abc/reservations.xlsx");
        assert_eq!(json["payload"]["originalFileName"], "reservations.xlsx");
    }

    #[test]
    fn test_wire_body_splices_event_id() {
        let envelope = serde_json::to_value(sample_envelope()).unwrap();
        let id = Uuid::new_v4();
        let body = wire_body(id, &envelope);

        assert_eq!(body["eventId"], id.to_string());
        assert_eq!(body["eventName"], "task.created.event");
        assert!(body["payload"].is_object());
    }

    #[test]
    fn test_parse_round_trip() {
        let envelope = serde_json::to_value(sample_envelope()).unwrap();
        let id = Uuid::new_v4();
        let body = serde_json::to_vec(&wire_body(id, &envelope)).unwrap();

        let parsed = TaskEventMessage::from_bytes(&body).unwrap();
        assert_eq!(parsed.event_id, id);
        assert_eq!(parsed.payload.original_file_name, "reservations.xlsx");
    }

    #[test]
    fn test_parse_rejects_missing_event_id() {
        let body = br#"{"eventName":"task.created.event","payload":{}}"#;
        assert_eq!(
            TaskEventMessage::from_bytes(body),
            Err(MessageRejection::MissingEventId)
        );
    }

    #[test]
    fn test_parse_rejects_missing_payload() {
        let id = Uuid::new_v4();
        let body = format!(r#"{{"eventId":"{id}","eventName":"task.created.event"}}"#);
        assert_eq!(
            TaskEventMessage::from_bytes(body.as_bytes()),
            Err(MessageRejection::MissingPayload)
        );
    }

    #[test]
    fn test_parse_rejects_unknown_event_name() {
        let id = Uuid::new_v4();
        let body =
            format!(r#"{{"eventId":"{id}","eventName":"task.deleted.event","payload":{{}}}}"#);
        assert_eq!(
            TaskEventMessage::from_bytes(body.as_bytes()),
            Err(MessageRejection::UnknownEventName(
                "task.deleted.event".to_string()
            ))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            TaskEventMessage::from_bytes(b"not json"),
            Err(MessageRejection::Malformed(_))
        ));
    }
}
