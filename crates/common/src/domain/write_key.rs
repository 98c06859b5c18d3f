use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Repository trait for write key lookups.
/// Infrastructure layer (PostgreSQL) implements this trait.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait WriteKeyRepository: Send + Sync {
    /// Resolve a write key to the workspace that owns it.
    /// Returns `Ok(None)` when no write key matches.
    async fn find_workspace_id(&self, write_key: &str) -> DomainResult<Option<String>>;
}
