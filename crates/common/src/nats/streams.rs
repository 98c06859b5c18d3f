use crate::nats::JetStreamPublisher;
use anyhow::{Context, Result};
use async_nats::jetstream::stream::Config as StreamConfig;
use tracing::info;

/// Subject wildcard covering every message of a stream
pub fn stream_subjects(stream_name: &str) -> String {
    format!("{}.*", stream_name)
}

/// Subject a single message of `stream_name` is published on, partitioned by key
pub fn stream_subject(stream_name: &str, partition_key: &str) -> String {
    format!("{}.{}", stream_name, partition_key)
}

/// Create each stream unless it already exists.
///
/// Safe to call on every startup. Any failure is returned to the caller,
/// nothing is created lazily afterwards.
pub async fn ensure_streams(
    publisher: &dyn JetStreamPublisher,
    stream_names: &[&str],
    num_replicas: usize,
) -> Result<()> {
    let num_replicas = num_replicas.max(1);

    for stream_name in stream_names {
        if publisher.get_stream(stream_name).await.is_ok() {
            info!(stream = %stream_name, "Stream already exists");
            continue;
        }

        let config = StreamConfig {
            name: stream_name.to_string(),
            subjects: vec![stream_subjects(stream_name)],
            description: Some(format!("Durable log of {} events", stream_name)),
            num_replicas,
            ..Default::default()
        };

        publisher
            .create_stream(config)
            .await
            .with_context(|| format!("Failed to provision stream {}", stream_name))?;
        info!(stream = %stream_name, num_replicas, "Created stream");
    }

    Ok(())
}
