//! Structured logging via `tracing`.

mod format;

pub use format::{report_degradation, Degradation, StructuredLogger};
