mod envelope;
mod event;
mod result;
mod write_key;

pub use envelope::*;
pub use event::*;
pub use result::*;
pub use write_key::*;
