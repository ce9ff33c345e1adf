//!
//! This crate contains the substrate shared by the Ren evaluator and its tools: interning,
//! series storage, configuration and the boot sequence.
//!

/// The startup phases of a universe.
pub mod boot;
/// Configuration of a universe.
pub mod config;
/// Facilities for string interning.
pub mod interner;
/// Length-tracked element storage.
pub mod series;

pub use boot::BootPhase;
pub use config::UniverseConfig;
pub use interner::Interner;
pub use series::{live_series, Series, SeriesError, SeriesFlags};
