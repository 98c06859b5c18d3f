use crate::domain::{DomainError, DomainResult};
use crate::garde::validate_struct;
use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Kind of behavioral event accepted by the ingestion surface.
///
/// The lowercase name doubles as the durable log topic the event is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Identify,
    Track,
}

impl EventType {
    pub const ALL: [EventType; 2] = [EventType::Identify, EventType::Track];

    pub fn topic(&self) -> &'static str {
        match self {
            EventType::Identify => "identify",
            EventType::Track => "track",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// Body of `POST /api/identify`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IdentifyPayload {
    #[garde(length(min = 1))]
    pub user_id: String,

    #[garde(custom(scalar_values))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traits: Option<Map<String, Value>>,

    /// Client-side idempotency key. Kept in `message_raw` only, the envelope
    /// always gets its own id.
    #[garde(skip)]
    #[serde(
        default,
        rename(deserialize = "messageId", serialize = "clientMessageId"),
        skip_serializing_if = "Option::is_none"
    )]
    pub client_message_id: Option<Uuid>,
}

/// Body of `POST /api/track`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrackPayload {
    #[garde(length(min = 1))]
    pub user_id: String,

    #[garde(length(min = 1))]
    pub event: String,

    #[garde(custom(scalar_values))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,

    /// Client-side idempotency key. Kept in `message_raw` only, the envelope
    /// always gets its own id.
    #[garde(skip)]
    #[serde(
        default,
        rename(deserialize = "messageId", serialize = "clientMessageId"),
        skip_serializing_if = "Option::is_none"
    )]
    pub client_message_id: Option<Uuid>,
}

/// A validated inbound event, tagged with its kind
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Identify(IdentifyPayload),
    Track(TrackPayload),
}

impl EventPayload {
    /// Parse and validate a raw JSON body for the given event kind.
    ///
    /// Decoding errors (not JSON, unknown fields, wrong types) and rule
    /// violations both surface as `DomainError::ValidationError`.
    pub fn parse(kind: EventType, raw: &[u8]) -> DomainResult<Self> {
        let payload = match kind {
            EventType::Identify => {
                let payload: IdentifyPayload = decode_json(raw)?;
                validate_struct(&payload)?;
                EventPayload::Identify(payload)
            }
            EventType::Track => {
                let payload: TrackPayload = decode_json(raw)?;
                validate_struct(&payload)?;
                EventPayload::Track(payload)
            }
        };
        Ok(payload)
    }

    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Identify(_) => EventType::Identify,
            EventPayload::Track(_) => EventType::Track,
        }
    }

    /// The payload as a JSON object, as the client sent it minus absent
    /// optional fields. A client `messageId` comes out as `clientMessageId`.
    pub fn to_json_object(&self) -> DomainResult<Map<String, Value>> {
        let value = match self {
            EventPayload::Identify(p) => serde_json::to_value(p),
            EventPayload::Track(p) => serde_json::to_value(p),
        }
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        match value {
            Value::Object(map) => Ok(map),
            other => Err(DomainError::ValidationError(format!(
                "payload must be a JSON object, got {}",
                other
            ))),
        }
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: &[u8]) -> DomainResult<T> {
    serde_json::from_slice(raw).map_err(|e| DomainError::ValidationError(e.to_string()))
}

/// Trait and property values must be flat: string, number or bool.
fn scalar_values(value: &Option<Map<String, Value>>, _ctx: &()) -> garde::Result {
    let Some(map) = value else {
        return Ok(());
    };

    for (key, v) in map {
        match v {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {}
            Value::Null => {
                return Err(garde::Error::new(format!("value for `{}` must not be null", key)))
            }
            Value::Array(_) => {
                return Err(garde::Error::new(format!(
                    "value for `{}` must be a string, number or boolean, got an array",
                    key
                )))
            }
            Value::Object(_) => {
                return Err(garde::Error::new(format!(
                    "value for `{}` must be a string, number or boolean, got an object",
                    key
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation_message(result: DomainResult<EventPayload>) -> String {
        match result {
            Err(DomainError::ValidationError(msg)) => msg,
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_identify_with_traits() {
        let body = br#"{"userId":"u1","traits":{"plan":"pro","seats":3,"beta":true}}"#;
        let payload = EventPayload::parse(EventType::Identify, body).unwrap();

        match payload {
            EventPayload::Identify(p) => {
                assert_eq!(p.user_id, "u1");
                let traits = p.traits.unwrap();
                assert_eq!(traits.len(), 3);
                assert_eq!(traits["seats"], Value::from(3));
                assert!(p.client_message_id.is_none());
            }
            other => panic!("Expected identify payload, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_track_with_client_message_id() {
        let id = Uuid::new_v4();
        let body = format!(
            r#"{{"userId":"u1","event":"Purchase","messageId":"{}"}}"#,
            id
        );
        let payload = EventPayload::parse(EventType::Track, body.as_bytes()).unwrap();

        assert_eq!(payload.event_type(), EventType::Track);
        match &payload {
            EventPayload::Track(p) => assert_eq!(p.client_message_id, Some(id)),
            other => panic!("Expected track payload, got {:?}", other),
        }

        let object = payload.to_json_object().unwrap();
        assert_eq!(object["clientMessageId"], id.to_string());
        assert!(!object.contains_key("messageId"));
    }

    #[test]
    fn test_missing_user_id_is_rejected() {
        let msg = validation_message(EventPayload::parse(
            EventType::Identify,
            br#"{"traits":{"plan":"pro"}}"#,
        ));
        assert!(msg.contains("userId"));
    }

    #[test]
    fn test_empty_user_id_is_rejected() {
        let msg = validation_message(EventPayload::parse(
            EventType::Identify,
            br#"{"userId":""}"#,
        ));
        assert!(msg.contains("user_id") || msg.contains("userId"));
    }

    #[test]
    fn test_track_requires_event() {
        let msg = validation_message(EventPayload::parse(
            EventType::Track,
            br#"{"userId":"u1"}"#,
        ));
        assert!(msg.contains("event"));
    }

    #[test]
    fn test_empty_event_name_is_rejected() {
        let result = EventPayload::parse(EventType::Track, br#"{"userId":"u1","event":""}"#);
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_nested_trait_value_is_rejected() {
        let msg = validation_message(EventPayload::parse(
            EventType::Identify,
            br#"{"userId":"u1","traits":{"address":{"city":"Paris"}}}"#,
        ));
        assert!(msg.contains("address"));
    }

    #[test]
    fn test_array_and_null_property_values_are_rejected() {
        assert!(EventPayload::parse(
            EventType::Track,
            br#"{"userId":"u1","event":"e","properties":{"tags":["a"]}}"#,
        )
        .is_err());
        assert!(EventPayload::parse(
            EventType::Track,
            br#"{"userId":"u1","event":"e","properties":{"coupon":null}}"#,
        )
        .is_err());
    }

    #[test]
    fn test_traits_of_wrong_type_are_rejected() {
        let result = EventPayload::parse(EventType::Identify, br#"{"userId":"u1","traits":"x"}"#);
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_unknown_top_level_field_is_rejected() {
        let msg = validation_message(EventPayload::parse(
            EventType::Identify,
            br#"{"userId":"u1","workspaceId":"w-evil"}"#,
        ));
        assert!(msg.contains("workspaceId"));
    }

    #[test]
    fn test_non_json_body_is_rejected() {
        let result = EventPayload::parse(EventType::Track, b"not json");
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_malformed_message_id_is_rejected() {
        let result = EventPayload::parse(
            EventType::Identify,
            br#"{"userId":"u1","messageId":"not-a-uuid"}"#,
        );
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_to_json_object_keeps_client_fields() {
        let payload = EventPayload::parse(
            EventType::Track,
            br#"{"userId":"u1","event":"Purchase","properties":{"amount":9.99}}"#,
        )
        .unwrap();

        let object = payload.to_json_object().unwrap();
        assert_eq!(object["userId"], "u1");
        assert_eq!(object["event"], "Purchase");
        assert_eq!(object["properties"]["amount"], 9.99);
        assert!(!object.contains_key("messageId"));
    }

    #[test]
    fn test_event_type_topics() {
        assert_eq!(EventType::Identify.topic(), "identify");
        assert_eq!(EventType::Track.to_string(), "track");
        assert_eq!(EventType::ALL.len(), 2);
    }
}
