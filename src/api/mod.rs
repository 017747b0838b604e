//! API module for all HTTP handlers

pub mod stats;
pub mod webhook;

// Re-export handlers
pub use stats::{root, status};
pub use webhook::{gitea_push, github_push};
