//! Garde validation helpers shared by request payloads.

use crate::domain::DomainError;
use garde::{Report, Validate};

/// Run garde rules and convert a failing report into `DomainError::ValidationError`
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| DomainError::ValidationError(describe_report(&report)))
}

/// One `path: message` entry per violation, joined with `; `
pub fn describe_report(report: &Report) -> String {
    report
        .iter()
        .map(|(path, error)| {
            let path = path.to_string();
            if path.is_empty() {
                error.message().to_string()
            } else {
                format!("{}: {}", path, error.message())
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}
