use async_nats::HeaderMap;
use bytes::Bytes;

/// JetStream deduplicates messages published with the same id inside the
/// stream's duplicate window.
pub const MSG_ID_HEADER: &str = "Nats-Msg-Id";

/// Request to publish a message to NATS
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub subject: String,
    pub payload: Bytes,
    /// Trace context is injected here by the tracing layer
    pub headers: HeaderMap,
}

impl PublishRequest {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Tag the message so a retried publish is stored only once
    pub fn with_message_id(mut self, message_id: &str) -> Self {
        self.headers.insert(MSG_ID_HEADER, message_id);
        self
    }

    pub fn message_id(&self) -> Option<&str> {
        self.headers.get(MSG_ID_HEADER).map(|v| v.as_str())
    }
}

/// Response from a publish operation
#[derive(Debug)]
pub struct PublishResponse {
    pub subject: String,
    /// Number of attempts it took, including the successful one
    pub attempts: u32,
}
