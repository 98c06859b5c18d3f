use super::types::MSG_ID_HEADER;
use async_nats::HeaderMap;
use bytes::Bytes;

/// A single consumed message, owned so it can travel through Tower layers
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    /// Name of the stream the message was fetched from
    pub stream: String,
    pub subject: String,
    pub payload: Bytes,
    /// Carries the publisher's trace context, when present
    pub headers: Option<HeaderMap>,
}

impl ConsumeRequest {
    pub fn new(
        stream: impl Into<String>,
        subject: impl Into<String>,
        payload: Bytes,
        headers: Option<HeaderMap>,
    ) -> Self {
        Self {
            stream: stream.into(),
            subject: subject.into(),
            payload,
            headers,
        }
    }

    /// Id the publisher tagged the message with, if any
    pub fn message_id(&self) -> Option<&str> {
        self.headers
            .as_ref()
            .and_then(|headers| headers.get(MSG_ID_HEADER))
            .map(|v| v.as_str())
    }
}

/// What the consumer loop should tell JetStream about a processed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeResponse {
    /// Processed, remove from the consumer
    Ack,
    /// Failed, redeliver after the ack wait
    Nak(Option<String>),
    /// Failed permanently, never redeliver
    Term(Option<String>),
}

impl ConsumeResponse {
    pub fn ack() -> Self {
        Self::Ack
    }

    pub fn nak(reason: impl Into<String>) -> Self {
        Self::Nak(Some(reason.into()))
    }

    pub fn term(reason: impl Into<String>) -> Self {
        Self::Term(Some(reason.into()))
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Nak(_) => "nak",
            Self::Term(_) => "term",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Ack => None,
            Self::Nak(reason) | Self::Term(reason) => reason.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_and_reason() {
        assert_eq!(ConsumeResponse::ack().outcome(), "ack");
        assert!(ConsumeResponse::ack().reason().is_none());

        let term = ConsumeResponse::term("bad payload");
        assert_eq!(term.outcome(), "term");
        assert_eq!(term.reason(), Some("bad payload"));
        assert!(!term.is_ack());

        assert_eq!(ConsumeResponse::nak("later").outcome(), "nak");
    }
}
