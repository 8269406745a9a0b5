//! vehsync-conv - Capability maps and telemetry normalization
//!
//! Turns the raw, vendor-shaped telemetry tree of a connected vehicle into
//! typed capability values.
//!
//! # Features
//!
//! - **TOML capability maps** - capability name → dotted telemetry path, per
//!   driver with per-vehicle-type overrides
//! - **Unit conversions** - Kelvin and tenths of Kelvin to half-degree °C,
//!   meters to km, seconds to minutes
//! - **Enum flags** - plug and charging states to booleans
//! - **Geofence** - haversine distance to the host location for `is_home`
//!
//! # Quick Start
//!
//! ```rust
//! use vehsync_conv::{CapabilityMap, StateMapper};
//! use vehsync_core::{CapabilityValue, GeoPoint, VehicleType};
//! use serde_json::json;
//!
//! let map = CapabilityMap::from_toml(r#"
//! [maps.car]
//! measure_temperature = "status.outsideTemperature"
//! "#).unwrap();
//!
//! let table = map.resolve("car", VehicleType::Legacy).unwrap();
//! let mapper = StateMapper::new(table, VehicleType::Legacy, GeoPoint::default());
//!
//! // 2732 tenths of Kelvin → 0 °C
//! let outcome = mapper.map(&json!({ "status": { "outsideTemperature": 2732 } }));
//! assert_eq!(outcome.get("measure_temperature"), Some(&CapabilityValue::Number(0.0)));
//! ```
//!
//! # Map Files
//!
//! ```toml
//! [meta]
//! name = "vw-connect"
//!
//! [maps.vw]
//! measure_battery = "status.batteryStatus.currentSOC_pct"
//! is_home = { latitude = "position.latitudeConv", longitude = "position.longitudeConv" }
//!
//! [maps.vw-skodae]
//! measure_battery = "status.charging.battery.stateOfChargeInPercent"
//! ```

pub mod definition;
pub mod error;
pub mod geo;
pub mod mapper;
pub mod normalize;
pub mod precision;
pub mod store;

pub use definition::PathSpec;
pub use error::{ConvError, ConvResult};
pub use mapper::{MappingOutcome, StateMapper};
pub use normalize::normalize;
pub use store::{CapabilityMap, MapMeta, MappingTable};
