//! Small string helpers shared by key generation and diagnostics.

pub mod format;

pub use format::{format_bytes, non_empty, prefix_chars};
