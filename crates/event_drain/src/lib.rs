pub mod domain;
pub mod event_drain;
pub mod nats;

pub use domain::*;
pub use event_drain::*;
pub use nats::*;
