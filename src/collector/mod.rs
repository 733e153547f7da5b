pub mod line_source;
pub mod tracing_layer;

use crate::buffer::BufferError;
use thiserror::Error;

pub use line_source::{PumpSummary, parse_line, pump_lines};
pub use tracing_layer::BufferedLayer;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
    #[error("Collection stopped")]
    CollectionStopped,
}
