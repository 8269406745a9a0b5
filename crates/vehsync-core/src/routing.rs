//! Routing of capability writes to backend state paths.
//!
//! Backend paths look like `vw-connect.0.<vin>.remote.lock`. Commands are
//! routed through one table keyed by `(Command, VehicleType)` so every call
//! site builds paths identically.

use crate::models::VehicleType;

/// Namespace prefix of every backend state path
pub const NAMESPACE: &str = "vw-connect.0";

/// Top-level channel of a vehicle's state tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Writable command states
    Remote,
    /// Reported status values
    Status,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Remote => "remote",
            Channel::Status => "status",
        }
    }
}

/// A typed backend state path for one vehicle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatePath {
    vin: String,
    channel: Channel,
    key: &'static str,
}

impl StatePath {
    pub fn new(vin: impl Into<String>, channel: Channel, key: &'static str) -> Self {
        Self {
            vin: vin.into(),
            channel,
            key,
        }
    }

    pub fn remote(vin: impl Into<String>, key: &'static str) -> Self {
        Self::new(vin, Channel::Remote, key)
    }

    pub fn status(vin: impl Into<String>, key: &'static str) -> Self {
        Self::new(vin, Channel::Status, key)
    }
}

impl std::fmt::Display for StatePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            NAMESPACE,
            self.vin,
            self.channel.as_str(),
            self.key
        )
    }
}

/// Version of a climate command; newer vehicles expose up to three variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    V1,
    V2,
    V3,
}

/// A remote command the host can issue through a capability write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Lock,
    Flash,
    Honk,
    ChargeMinLimit,
    MaxChargeCurrent,
    BatteryCharge,
    Climatisation(Generation),
    Ventilation(Generation),
    WindowHeating,
    TargetTemperature,
    /// Not a backend command: triggers a forced refresh
    ForceRefresh,
}

impl Command {
    /// Every command, in dispatch order
    pub const ALL: [Command; 15] = [
        Command::Lock,
        Command::Flash,
        Command::Honk,
        Command::ChargeMinLimit,
        Command::MaxChargeCurrent,
        Command::BatteryCharge,
        Command::Climatisation(Generation::V1),
        Command::Climatisation(Generation::V2),
        Command::Climatisation(Generation::V3),
        Command::Ventilation(Generation::V1),
        Command::Ventilation(Generation::V2),
        Command::Ventilation(Generation::V3),
        Command::WindowHeating,
        Command::TargetTemperature,
        Command::ForceRefresh,
    ];

    /// Capability that carries this command
    pub fn capability(&self) -> &'static str {
        match self {
            Command::Lock => "locked",
            Command::Flash => "remote_flash",
            Command::Honk => "remote_flash_honk",
            Command::ChargeMinLimit => "remote_charge_min_limit",
            Command::MaxChargeCurrent => "remote_max_charge_current",
            Command::BatteryCharge => "remote_battery_charge",
            Command::Climatisation(Generation::V1) => "remote_climatisation",
            Command::Climatisation(Generation::V2) => "remote_climatisation_v2",
            Command::Climatisation(Generation::V3) => "remote_climatisation_v3",
            Command::Ventilation(Generation::V1) => "remote_ventilation",
            Command::Ventilation(Generation::V2) => "remote_ventilation_v2",
            Command::Ventilation(Generation::V3) => "remote_ventilation_v3",
            Command::WindowHeating => "remote_window_heating",
            Command::TargetTemperature => "target_temperature",
            Command::ForceRefresh => "remote_force_refresh",
        }
    }

    pub fn from_capability(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.capability() == name)
    }

    /// Momentary commands whose capability falls back to `false` shortly
    /// after being issued
    pub fn is_one_shot(&self) -> bool {
        matches!(self, Command::Flash | Command::Honk | Command::ForceRefresh)
    }
}

/// Where a command goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Send a state change to this backend path
    State(StatePath),
    /// Run a forced refresh instead of talking to the backend
    ForceRefresh,
}

/// Resolve the backend route of a command for a vehicle
pub fn route(command: Command, vehicle_type: VehicleType, vin: &str) -> Route {
    let remote = |key| Route::State(StatePath::remote(vin, key));

    match command {
        Command::Lock => remote("lock"),
        Command::Flash => remote("flash"),
        Command::Honk => remote("honk"),
        Command::ChargeMinLimit => remote("chargeMinLimit"),
        Command::MaxChargeCurrent => remote("maxChargeCurrent"),
        Command::WindowHeating => remote("windowheating"),
        Command::BatteryCharge if vehicle_type.is_modern() => remote("charging"),
        Command::BatteryCharge => remote("batterycharge"),
        Command::Climatisation(generation) => remote(match generation {
            Generation::V1 => "climatisation",
            Generation::V2 => "climatisationv2",
            Generation::V3 => "climatisationv3",
        }),
        Command::Ventilation(_) if vehicle_type == VehicleType::Skodae => {
            remote("air-conditioning")
        }
        Command::Ventilation(generation) => remote(match generation {
            Generation::V1 => "ventilation",
            Generation::V2 => "ventilationv2",
            Generation::V3 => "ventilationv3",
        }),
        Command::TargetTemperature => match vehicle_type {
            VehicleType::Id | VehicleType::Audietron => Route::State(StatePath::status(
                vin,
                "climatisationSettings.targetTemperature_C",
            )),
            VehicleType::Skodae => remote("targetTemperatureInCelsius"),
            VehicleType::Legacy => remote("climatisationTemperature"),
        },
        Command::ForceRefresh => Route::ForceRefresh,
    }
}
