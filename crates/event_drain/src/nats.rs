mod consumer_connector;
mod envelope_drain_service;

pub use consumer_connector::*;
pub use envelope_drain_service::*;
