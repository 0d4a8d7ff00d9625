mod buffering;

pub use buffering::{CircularLineBuffer, LineError, MAX_LINE_BYTES};
