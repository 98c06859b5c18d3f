use chrono::SecondsFormat;
use common::domain::{
    current_second, DomainError, DomainResult, Envelope, EventPayload, EventType,
};
use serde_json::Value;
use uuid::Uuid;

/// Parse and validate a request body for the given event kind
pub fn validate(kind: EventType, raw: &[u8]) -> DomainResult<EventPayload> {
    EventPayload::parse(kind, raw)
}

/// Wrap a validated payload into the canonical envelope for `workspace_id`.
///
/// `message_id` is always freshly minted; a client `messageId` only survives
/// as `clientMessageId` inside `message_raw`. `message_raw` is the client's
/// object plus `type`, `messageId` and `timestamp`. Both timestamps are the
/// current second.
pub fn assemble(payload: &EventPayload, workspace_id: &str) -> DomainResult<Envelope> {
    if workspace_id.is_empty() {
        return Err(DomainError::InvalidWriteKey);
    }

    let message_id = Uuid::new_v4();
    let now = current_second();

    let mut raw = payload.to_json_object()?;
    raw.insert(
        "type".to_string(),
        Value::String(payload.event_type().topic().to_string()),
    );
    raw.insert(
        "messageId".to_string(),
        Value::String(message_id.to_string()),
    );
    raw.insert(
        "timestamp".to_string(),
        Value::String(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );

    let message_raw = serde_json::to_string(&raw)
        .map_err(|e| DomainError::RepositoryError(anyhow::Error::new(e)))?;

    Ok(Envelope {
        workspace_id: workspace_id.to_string(),
        message_id,
        event_type: payload.event_type(),
        message_raw,
        event_time: now,
        processing_time: Some(now),
    })
}

/// Validate and assemble in one step
pub fn build(kind: EventType, raw: &[u8], workspace_id: &str) -> DomainResult<Envelope> {
    let payload = validate(kind, raw)?;
    assemble(&payload, workspace_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn raw_of(envelope: &Envelope) -> serde_json::Map<String, Value> {
        match serde_json::from_str(&envelope.message_raw).unwrap() {
            Value::Object(map) => map,
            other => panic!("message_raw is not an object: {}", other),
        }
    }

    #[test]
    fn test_build_track_envelope() {
        let before = current_second();
        let body = br#"{"userId":"u1","event":"Purchase","properties":{"amount":42,"vip":true}}"#;

        let envelope = build(EventType::Track, body, "ws-1").unwrap();

        assert_eq!(envelope.workspace_id, "ws-1");
        assert_eq!(envelope.event_type, EventType::Track);
        assert!(envelope.event_time >= before);
        assert_eq!(envelope.event_time.nanosecond(), 0);
        assert_eq!(envelope.processing_time, Some(envelope.event_time));

        let raw = raw_of(&envelope);
        assert_eq!(raw["userId"], "u1");
        assert_eq!(raw["event"], "Purchase");
        assert_eq!(raw["properties"]["amount"], 42);
        assert_eq!(raw["type"], "track");
        assert_eq!(raw["messageId"], envelope.message_id.to_string());
        assert!(raw["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_client_message_id_stays_in_message_raw() {
        let id = Uuid::new_v4();
        let body = format!(r#"{{"userId":"u1","messageId":"{}"}}"#, id);

        let envelope = build(EventType::Identify, body.as_bytes(), "ws-1").unwrap();

        assert_ne!(envelope.message_id, id);
        let raw = raw_of(&envelope);
        assert_eq!(raw["type"], "identify");
        assert_eq!(raw["clientMessageId"], id.to_string());
        assert_eq!(raw["messageId"], envelope.message_id.to_string());
    }

    #[test]
    fn test_same_client_message_id_across_workspaces_gets_distinct_ids() {
        let body = br#"{"userId":"u1","messageId":"11111111-1111-4111-8111-111111111111"}"#;

        let a = build(EventType::Identify, body, "tenant-a").unwrap();
        let b = build(EventType::Identify, body, "tenant-b").unwrap();
        let again = build(EventType::Identify, body, "tenant-a").unwrap();

        assert_ne!(a.message_id, b.message_id);
        assert_ne!(a.message_id, again.message_id);
    }

    #[test]
    fn test_each_envelope_gets_its_own_message_id() {
        let body = br#"{"userId":"u1"}"#;
        let a = build(EventType::Identify, body, "ws-1").unwrap();
        let b = build(EventType::Identify, body, "ws-1").unwrap();
        assert_ne!(a.message_id, b.message_id);
    }

    #[test]
    fn test_invalid_payloads_are_rejected() {
        let cases: [(EventType, &[u8]); 5] = [
            (EventType::Identify, br#"{"traits":{"plan":"pro"}}"#),
            (EventType::Identify, br#"{"userId":"u1","traits":"pro"}"#),
            (EventType::Track, br#"{"userId":"u1"}"#),
            (EventType::Track, br#"{"userId":"u1","event":"x","extra":1}"#),
            (EventType::Track, b"not json"),
        ];

        for (kind, body) in cases {
            let result = build(kind, body, "ws-1");
            assert!(
                matches!(result, Err(DomainError::ValidationError(_))),
                "expected validation error for {}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_assemble_requires_workspace() {
        let payload = validate(EventType::Identify, br#"{"userId":"u1"}"#).unwrap();
        assert!(matches!(
            assemble(&payload, ""),
            Err(DomainError::InvalidWriteKey)
        ));
    }
}
