mod client;
mod config;
mod write_key_repository;

pub use client::*;
pub use config::*;
pub use write_key_repository::*;
