//! Shared data models for the synchronization engine

mod capability;
mod settings;
mod telemetry;
mod vehicle;

pub use capability::*;
pub use settings::*;
pub use telemetry::*;
pub use vehicle::*;
