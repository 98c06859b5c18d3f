mod credential_resolver;
mod delivery_router;
mod envelope_builder;
mod ingestion_service;

pub use credential_resolver::*;
pub use delivery_router::*;
pub use envelope_builder::*;
pub use ingestion_service::*;
