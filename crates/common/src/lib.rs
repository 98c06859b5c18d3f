pub mod clickhouse;
pub mod domain;
pub mod garde;
pub mod nats;
pub mod postgres;
pub mod telemetry;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockEnvelopeProducer;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockEnvelopeRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockWriteKeyRepository;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamConsumer;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamPublisher;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockPullConsumer;
