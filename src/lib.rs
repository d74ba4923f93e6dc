//! Quarantiner library crate
//!
//! Exposes the quarantine engine so the CLI, benchmarks, and external
//! tooling (PR bots, webhook handlers) share one implementation.

pub mod config;
pub mod error;
pub mod golang;
pub mod results;
pub mod telemetry;

pub use error::{EngineError, EngineResult};
