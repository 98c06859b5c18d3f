use common::domain::{
    DomainResult, Envelope, EnvelopeProducer, EnvelopeRepository, InsertEnvelopesInput,
    InsertMode,
};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Where accepted envelopes go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Straight into the store, one async insert per request
    Direct,
    /// Onto the durable log, drained into the store later
    #[default]
    Buffered,
}

impl FromStr for DeliveryMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(DeliveryMode::Direct),
            "buffered" => Ok(DeliveryMode::Buffered),
            other => Err(anyhow::anyhow!(
                "unknown delivery mode '{}', expected 'direct' or 'buffered'",
                other
            )),
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Direct => f.write_str("direct"),
            DeliveryMode::Buffered => f.write_str("buffered"),
        }
    }
}

/// Sends each envelope down the path chosen at startup
pub enum DeliveryRouter {
    Direct {
        repository: Arc<dyn EnvelopeRepository>,
    },
    Buffered {
        producer: Arc<dyn EnvelopeProducer>,
    },
}

impl DeliveryRouter {
    pub fn direct(repository: Arc<dyn EnvelopeRepository>) -> Self {
        DeliveryRouter::Direct { repository }
    }

    pub fn buffered(producer: Arc<dyn EnvelopeProducer>) -> Self {
        DeliveryRouter::Buffered { producer }
    }

    pub fn mode(&self) -> DeliveryMode {
        match self {
            DeliveryRouter::Direct { .. } => DeliveryMode::Direct,
            DeliveryRouter::Buffered { .. } => DeliveryMode::Buffered,
        }
    }

    #[instrument(skip_all, fields(mode = %self.mode(), message_id = %envelope.message_id))]
    pub async fn deliver(&self, envelope: &Envelope) -> DomainResult<()> {
        match self {
            DeliveryRouter::Direct { repository } => {
                repository
                    .insert_batch(InsertEnvelopesInput {
                        envelopes: vec![envelope.clone()],
                        mode: InsertMode::Async,
                    })
                    .await?
            }
            DeliveryRouter::Buffered { producer } => producer.publish(envelope).await?,
        }

        debug!("envelope delivered");
        Ok(())
    }
}
