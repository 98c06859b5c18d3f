mod envelope_producer;

pub use envelope_producer::*;
