use crate::domain::{DomainError, DomainResult, WriteKeyRepository};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tracing::{debug, instrument};

const FIND_WORKSPACE_BY_SECRET: &str = "SELECT write_key.workspace_id::text
     FROM write_key
     INNER JOIN secret ON write_key.secret_id = secret.id
     WHERE secret.value = $1
     LIMIT 1";

/// PostgreSQL implementation of WriteKeyRepository trait
#[derive(Clone)]
pub struct PostgresWriteKeyRepository {
    client: PostgresClient,
}

impl PostgresWriteKeyRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WriteKeyRepository for PostgresWriteKeyRepository {
    #[instrument(skip(self, write_key))]
    async fn find_workspace_id(&self, write_key: &str) -> DomainResult<Option<String>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(FIND_WORKSPACE_BY_SECRET, &[&write_key])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let workspace_id = row.map(|r| r.get::<_, String>(0));
        debug!(found = workspace_id.is_some(), "write key lookup finished");

        Ok(workspace_id)
    }
}
