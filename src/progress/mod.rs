//! Progress reporting module
//!
//! Provides a live spinner with running file and byte counts for copy
//! operations.

mod reporter;

pub use reporter::*;
