//! Core types and sampling pipeline for the binlevel trash level recorder.

/// Bin enumeration over the telemetry store.
pub mod enumerator;
/// Distance to fill level conversion.
pub mod level;
/// In-memory store implementations for tests and local runs.
pub mod memory;
/// Domain models and identifiers shared by all backends.
pub mod model;
/// Traits describing the store interfaces.
pub mod ports;
/// Per-bin sampling and pass reports.
pub mod sampler;
/// High-level service facade used by triggers.
pub mod service;

pub use enumerator::*;
pub use level::*;
pub use model::*;
pub use ports::*;
pub use sampler::*;
pub use service::*;
