//! vehsync-core - Core ports and types for the vehicle state synchronization engine
//!
//! This crate provides the abstractions the engine is written against:
//! the backend vehicle client, the automation host's device model, the
//! command routing table and the shared data model.

pub mod client;
pub mod error;
pub mod host;
pub mod models;
pub mod routing;

pub use client::{ClientFactory, ClientOptions, ErrorSink, StateChange, VehicleClient};
pub use error::{
    ClientError, ClientResult, CommandFailure, HostError, HostResult, SyncError, SyncResult,
};
pub use host::{GeoPoint, HostDevice};
pub use models::*;
pub use routing::{Command, Route, StatePath};
