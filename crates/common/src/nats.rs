mod client;
mod middleware;
mod streams;
mod tower_consumer;
mod trace_context;
mod traits;

pub use client::*;
pub use middleware::*;
pub use streams::*;
pub use tower_consumer::*;
pub use trace_context::*;
pub use traits::*;
