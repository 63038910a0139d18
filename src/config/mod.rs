//! Configuration module for the bridgeward daemon.
//!
//! Handles loading and validating daemon configuration from TOML files.

mod settings;

pub use settings::*;
