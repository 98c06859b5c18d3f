mod drain_state;

pub use drain_state::*;
