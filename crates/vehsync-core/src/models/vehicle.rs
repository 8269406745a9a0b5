//! Vehicle type model

use serde::{Deserialize, Serialize};

/// Backend vehicle type.
///
/// The modern types (`Id`, `Audietron`, `Skodae`) talk to the newer vendor
/// APIs: they need no security PIN for remote commands and use the modern
/// command paths. Everything else is served by the legacy API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    /// VW ID family
    Id,
    /// Audi e-tron
    Audietron,
    /// Skoda Enyaq family
    Skodae,
    /// Legacy connect API
    Legacy,
}

impl VehicleType {
    /// Settings/wire name of this type
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Id => "id",
            VehicleType::Audietron => "audietron",
            VehicleType::Skodae => "skodae",
            VehicleType::Legacy => "legacy",
        }
    }

    /// Remote commands for this type are accepted without a security PIN
    pub fn is_pin_exempt(&self) -> bool {
        !matches!(self, VehicleType::Legacy)
    }

    /// Type is served by the modern vendor API
    pub fn is_modern(&self) -> bool {
        !matches!(self, VehicleType::Legacy)
    }
}

impl std::fmt::Display for VehicleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VehicleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(VehicleType::Id),
            "audietron" => Ok(VehicleType::Audietron),
            "skodae" => Ok(VehicleType::Skodae),
            "legacy" => Ok(VehicleType::Legacy),
            _ => Err(format!("Unknown vehicle type: '{}'", s)),
        }
    }
}
