use crate::clickhouse::ClickHouseClient;
use crate::domain::{
    DomainError, DomainResult, Envelope, EnvelopeRepository, InsertEnvelopesInput, InsertMode,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// One row of the events table
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct EnvelopeRow {
    pub workspace_id: String,
    pub message_raw: String,
    #[serde(with = "clickhouse::serde::chrono::datetime::option")]
    pub processing_time: Option<DateTime<Utc>>,
    #[serde(with = "clickhouse::serde::uuid")]
    pub message_id: Uuid,
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    pub event_time: DateTime<Utc>,
}

impl From<&Envelope> for EnvelopeRow {
    fn from(envelope: &Envelope) -> Self {
        EnvelopeRow {
            workspace_id: envelope.workspace_id.clone(),
            message_raw: envelope.message_raw.clone(),
            processing_time: envelope.processing_time,
            message_id: envelope.message_id,
            event_time: envelope.event_time,
        }
    }
}

/// Server settings applied to an insert for the requested acknowledgment mode
pub fn insert_settings(mode: InsertMode) -> &'static [(&'static str, &'static str)] {
    match mode {
        InsertMode::Sync => &[("wait_end_of_query", "1")],
        InsertMode::Async => &[("async_insert", "1"), ("wait_for_async_insert", "0")],
    }
}

/// ClickHouse implementation of EnvelopeRepository
#[derive(Clone)]
pub struct ClickHouseEnvelopeRepository {
    client: ClickHouseClient,
    table: String,
    insert_timeout: Duration,
}

impl ClickHouseEnvelopeRepository {
    pub fn new(client: ClickHouseClient, table: String, insert_timeout: Duration) -> Self {
        Self {
            client,
            table,
            insert_timeout,
        }
    }

    fn client_for(&self, mode: InsertMode) -> Client {
        insert_settings(mode)
            .iter()
            .fold(self.client.get_client().clone(), |client, (name, value)| {
                client.with_option(*name, *value)
            })
    }

    async fn write_rows(&self, rows: &[EnvelopeRow], mode: InsertMode) -> DomainResult<()> {
        let client = self.client_for(mode);

        let mut insert = client
            .insert::<EnvelopeRow>(&self.table)
            .await
            .map_err(|e| {
                error!("failed to create ClickHouse inserter: {}", e);
                DomainError::RepositoryError(e.into())
            })?;

        for row in rows {
            insert.write(row).await.map_err(|e| {
                error!("failed to write row to ClickHouse: {}", e);
                DomainError::RepositoryError(e.into())
            })?;
        }

        insert.end().await.map_err(|e| {
            error!("failed to finalize ClickHouse insert: {}", e);
            DomainError::RepositoryError(e.into())
        })
    }
}

#[async_trait]
impl EnvelopeRepository for ClickHouseEnvelopeRepository {
    #[instrument(skip(self, input), fields(envelope_count = input.envelopes.len(), mode = ?input.mode, table = %self.table))]
    async fn insert_batch(&self, input: InsertEnvelopesInput) -> DomainResult<()> {
        if input.envelopes.is_empty() {
            debug!("no envelopes to insert, skipping");
            return Ok(());
        }

        let rows: Vec<EnvelopeRow> = input.envelopes.iter().map(EnvelopeRow::from).collect();

        match tokio::time::timeout(self.insert_timeout, self.write_rows(&rows, input.mode)).await {
            Ok(result) => result?,
            Err(_) => {
                error!(
                    timeout_ms = self.insert_timeout.as_millis() as u64,
                    "ClickHouse insert timed out"
                );
                return Err(DomainError::Timeout(format!(
                    "insert into {} exceeded {:?}",
                    self.table, self.insert_timeout
                )));
            }
        }

        debug!(rows_inserted = rows.len(), "inserted envelope batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{current_second, EventType};

    #[test]
    fn test_envelope_to_row_conversion() {
        let now = current_second();
        let envelope = Envelope {
            workspace_id: "ws-123".to_string(),
            message_id: Uuid::new_v4(),
            event_type: EventType::Track,
            message_raw: r#"{"event":"Purchase"}"#.to_string(),
            event_time: now,
            processing_time: Some(now),
        };

        let row = EnvelopeRow::from(&envelope);

        assert_eq!(row.workspace_id, "ws-123");
        assert_eq!(row.message_id, envelope.message_id);
        assert_eq!(row.message_raw, envelope.message_raw);
        assert_eq!(row.event_time, now);
        assert_eq!(row.processing_time, Some(now));
    }

    #[test]
    fn test_insert_settings_per_mode() {
        assert_eq!(insert_settings(InsertMode::Sync), &[("wait_end_of_query", "1")]);

        let async_settings = insert_settings(InsertMode::Async);
        assert!(async_settings.contains(&("async_insert", "1")));
        assert!(async_settings.contains(&("wait_for_async_insert", "0")));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        // Unroutable URL: any network call would fail the test
        let client = ClickHouseClient::new(&crate::clickhouse::ClickHouseConfig {
            url: "http://127.0.0.1:1".to_string(),
            database: "default".to_string(),
            username: "default".to_string(),
            password: String::new(),
        });
        let repository =
            ClickHouseEnvelopeRepository::new(client, "events".to_string(), Duration::from_secs(1));

        let result = repository
            .insert_batch(InsertEnvelopesInput {
                envelopes: vec![],
                mode: InsertMode::Sync,
            })
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_insert_past_timeout_is_timeout_error() {
        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = ClickHouseClient::new(&crate::clickhouse::ClickHouseConfig {
            url: format!("http://{}", addr),
            database: "default".to_string(),
            username: "default".to_string(),
            password: String::new(),
        });
        let repository = ClickHouseEnvelopeRepository::new(
            client,
            "user_events_v2".to_string(),
            Duration::from_millis(100),
        );

        let now = current_second();
        let result = repository
            .insert_batch(InsertEnvelopesInput {
                envelopes: vec![Envelope {
                    workspace_id: "ws-1".to_string(),
                    message_id: Uuid::new_v4(),
                    event_type: EventType::Identify,
                    message_raw: r#"{"userId":"u1"}"#.to_string(),
                    event_time: now,
                    processing_time: Some(now),
                }],
                mode: InsertMode::Sync,
            })
            .await;

        match result {
            Err(DomainError::Timeout(msg)) => assert!(msg.contains("user_events_v2")),
            other => panic!("expected Timeout, got {:?}", other),
        }
    }
}
