use common::domain::{DomainError, DomainResult, WriteKeyRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const BEARER_SCHEME: &str = "Bearer";

/// Strip a `Bearer` scheme, matched case-insensitively. A bare scheme leaves
/// an empty credential.
fn strip_bearer(value: &str) -> Option<&str> {
    let scheme = value.get(..BEARER_SCHEME.len())?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return None;
    }

    let rest = &value[BEARER_SCHEME.len()..];
    (rest.is_empty() || rest.starts_with(char::is_whitespace)).then_some(rest)
}

/// Pull the credential out of an `Authorization` header value.
///
/// The value is trimmed and an optional `Bearer` scheme is stripped. Returns
/// `None` when nothing usable is left.
pub fn extract_write_key(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let value = strip_bearer(value).map(str::trim).unwrap_or(value);

    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Maps a write key to the workspace that owns it
pub struct CredentialResolver {
    repository: Arc<dyn WriteKeyRepository>,
    lookup_timeout: Duration,
}

impl CredentialResolver {
    pub fn new(repository: Arc<dyn WriteKeyRepository>, lookup_timeout: Duration) -> Self {
        Self {
            repository,
            lookup_timeout,
        }
    }

    /// `Ok(None)` means the key is unknown. Infrastructure failures and
    /// lookups exceeding the timeout are errors.
    #[instrument(skip_all)]
    pub async fn resolve(&self, write_key: &str) -> DomainResult<Option<String>> {
        if write_key.is_empty() {
            return Ok(None);
        }

        let workspace_id =
            tokio::time::timeout(self.lookup_timeout, self.repository.find_workspace_id(write_key))
                .await
                .map_err(|_| {
                    DomainError::Timeout(format!(
                        "write key lookup exceeded {:?}",
                        self.lookup_timeout
                    ))
                })??;

        debug!(found = workspace_id.is_some(), "write key lookup finished");
        Ok(workspace_id)
    }
}
