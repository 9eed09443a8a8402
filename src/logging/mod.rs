//! Structured JSON logging.

mod format;

pub use format::{RunSummary, SplitCounts, StructuredLogger};
