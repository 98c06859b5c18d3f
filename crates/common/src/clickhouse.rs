mod client;
mod envelope_repository;

pub use client::*;
pub use envelope_repository::*;
