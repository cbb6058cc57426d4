//! Configuration module for StoreBridge
//!
//! CLI arguments, location parsing and backend option loading.

mod settings;

pub use settings::*;
