//! Utility functions for string formatting and manipulation.

pub mod format;

pub use format::{redact_token, truncate_string};
