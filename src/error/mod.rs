//! Error types for the bridgeward daemon.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
