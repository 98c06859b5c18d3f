mod consumer_tracing;
mod consumer_types;
mod logging;
mod publish_tracing;
mod publisher;
mod retry;
mod types;

pub use consumer_tracing::*;
pub use consumer_types::*;
pub use logging::*;
pub use publish_tracing::*;
pub use publisher::*;
pub use retry::*;
pub use types::*;
