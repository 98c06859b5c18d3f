use crate::domain::result::DomainResult;
use crate::domain::EventType;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical, store-ready record of one accepted event.
///
/// This is also the wire format on the durable log (JSON). Records read back
/// from the log that lack a `message_id` or `event_time` get a fresh UUID and
/// the current second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub workspace_id: String,
    #[serde(default = "Uuid::new_v4")]
    pub message_id: Uuid,
    pub event_type: EventType,
    pub message_raw: String,
    #[serde(default = "current_second")]
    pub event_time: DateTime<Utc>,
    #[serde(default)]
    pub processing_time: Option<DateTime<Utc>>,
}

impl Envelope {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to serialize envelope")
    }

    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(bytes).context("Failed to deserialize envelope")
    }
}

/// Current UTC time truncated to whole seconds (the store's DateTime precision)
pub fn current_second() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// How the store acknowledges an insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Returns once the rows are written
    Sync,
    /// Returns once the rows are queued by the store
    Async,
}

/// Input for inserting envelopes (batch operation)
#[derive(Debug, Clone)]
pub struct InsertEnvelopesInput {
    pub envelopes: Vec<Envelope>,
    pub mode: InsertMode,
}

/// Trait for publishing envelopes to the durable log
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EnvelopeProducer: Send + Sync {
    /// Publish a single envelope on the topic named by its event type.
    /// Returns once the log has acknowledged the message.
    async fn publish(&self, envelope: &Envelope) -> DomainResult<()>;
}

/// Repository trait for the analytical store
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EnvelopeRepository: Send + Sync {
    /// Insert a batch of envelopes. An empty batch is a no-op.
    /// Failure handling: entire batch fails, nothing is retried.
    async fn insert_batch(&self, input: InsertEnvelopesInput) -> DomainResult<()>;
}
