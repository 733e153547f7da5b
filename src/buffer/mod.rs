pub mod coordinator;
pub mod encoder;
pub mod error;
pub mod record_buffer;
pub mod stats;

pub use coordinator::{CoordinatorConfig, DelayedFlushCoordinator, delay_from_secs, is_delivering};
pub use encoder::{BatchEncoder, EncodePolicy};
pub use error::BufferError;
pub use record_buffer::BoundedRecordBuffer;
pub use stats::{FlushStats, FlushTrigger};
