#![warn(rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_possible_truncation, // Millisecond counters stay far below u64::MAX
    clippy::cast_precision_loss,      // Acceptable for display
    clippy::missing_errors_doc,       // Error enums are documented at the type
    clippy::missing_panics_doc,       // Library code does not panic
    clippy::module_name_repetitions,  // e.g. BufferError in buffer module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

pub mod app;
pub mod buffer;
pub mod collector;
pub mod domain;
pub mod sender;

// Re-export main types for easy access
pub use app::{App, Config};
pub use buffer::{BufferError, CoordinatorConfig, DelayedFlushCoordinator, EncodePolicy};
pub use collector::BufferedLayer;
pub use domain::{LogLevel, LogRecord};
pub use sender::{RecordHandler, SinkError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
