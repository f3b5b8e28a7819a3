//! SnipFrame Common Utilities
//!
//! Shared infrastructure for all SnipFrame crates:
//! - Error taxonomy (precondition / runtime / empty result) and result alias
//! - Run clocks, drift measurement, and rate control for the export loop
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
