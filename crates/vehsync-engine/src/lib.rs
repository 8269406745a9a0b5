//! vehsync-engine - Vehicle state synchronization engine
//!
//! Keeps one host device in sync with a connected vehicle's remote backend:
//! polls and normalizes telemetry into capability values, routes capability
//! writes to backend commands, and recovers from backend error signals.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        VehicleDevice                         │
//! │  init / on_settings / on_capability_write / on_deleted       │
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────┐   │
//! │  │ConfigResolver│  │ Reconciler   │  │ CommandDispatcher │   │
//! │  │ (settings)   │  │(capabilities)│  │ (writes → paths)  │   │
//! │  └──────┬───────┘  └──────────────┘  └─────────┬─────────┘   │
//! │         │                                      │             │
//! │  ┌──────┴────────┐   ticks   ┌───────────┐     │             │
//! │  │ClientLifecycle│──────────▶│ Scheduler │     │             │
//! │  │ (client, task)│           │ + Mapper  │     │             │
//! │  └──────┬────────┘           └─────┬─────┘     │             │
//! │         │      error lines         │           │             │
//! │         │   ┌─────────────────┐    │           │             │
//! │         │   │ RecoveryHandler │    │           │             │
//! │         │   └────────▲────────┘    │           │             │
//! └─────────┼────────────┼─────────────┼───────────┼─────────────┘
//!           ▼            │             ▼           ▼
//!     ┌────────────────────────┐   ┌────────────────────┐
//!     │ VehicleClient (backend)│   │ HostDevice (host)  │
//!     └────────────────────────┘   └────────────────────┘
//! ```

pub mod config;
pub mod device;
pub mod dispatcher;
pub mod lifecycle;
pub mod reconciler;
pub mod recovery;
pub mod resolver;
pub mod scheduler;
pub mod secret;
pub mod store;
pub mod testing;

pub use config::{EngineConfig, EngineTimings, FORCE_UPDATE_THRESHOLD};
pub use device::{CycleReport, DeviceStatus, VehicleDevice};
pub use dispatcher::{CommandBatch, DispatchOutcome};
pub use lifecycle::LifecycleState;
pub use recovery::{RecoveryAction, RecoverySignal};
pub use resolver::{ConfigResolver, ResolvedConfig};
pub use scheduler::RefreshKind;
pub use secret::{SecretCipher, XorHexCipher};

// Re-export for convenience
pub use vehsync_core::{
    CapabilityValue, ClientFactory, DeviceSettings, HostDevice, SyncError, SyncResult,
    VehicleClient, VehicleType,
};
