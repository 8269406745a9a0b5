//! Capability map - the static table from capability names to telemetry paths
//!
//! Tables are keyed by `"<driver>-<type>"` with a fallback to `"<driver>"`,
//! so a driver can share one table across vehicle types and override it for
//! the types whose telemetry is laid out differently.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use vehsync_core::VehicleType;

use crate::definition::PathSpec;
use crate::error::ConvResult;

/// Capability name → telemetry path, kept in map file order
///
/// Mapping passes walk the entries in this order, so flow triggers fire in
/// the order the map lists their capabilities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingTable {
    entries: Vec<(String, PathSpec)>,
}

impl MappingTable {
    pub fn get(&self, capability: &str) -> Option<&PathSpec> {
        self.entries
            .iter()
            .find(|(name, _)| name == capability)
            .map(|(_, spec)| spec)
    }

    /// Capability names in table order
    pub fn capabilities(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A repeated capability replaces the earlier entry in place
impl FromIterator<(String, PathSpec)> for MappingTable {
    fn from_iter<I: IntoIterator<Item = (String, PathSpec)>>(iter: I) -> Self {
        let mut entries: Vec<(String, PathSpec)> = Vec::new();
        for (name, spec) in iter {
            match entries.iter_mut().find(|(existing, _)| *existing == name) {
                Some(entry) => entry.1 = spec,
                None => entries.push((name, spec)),
            }
        }
        Self { entries }
    }
}

impl<'a> IntoIterator for &'a MappingTable {
    type Item = &'a (String, PathSpec);
    type IntoIter = std::slice::Iter<'a, (String, PathSpec)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<'de> Deserialize<'de> for MappingTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = MappingTable;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a table of capability paths")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: de::MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some(entry) = map.next_entry::<String, PathSpec>()? {
                    entries.push(entry);
                }
                Ok(entries.into_iter().collect())
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// Map shipped with the crate
const BUILTIN_MAP: &str = include_str!("../maps/capability_map.toml");

/// Metadata about a map file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Capability map file format
#[derive(Debug, Deserialize)]
struct MapFile {
    #[serde(default)]
    meta: Option<MapMeta>,
    #[serde(default)]
    maps: BTreeMap<String, MappingTable>,
}

/// Collection of mapping tables
#[derive(Debug, Clone, Default)]
pub struct CapabilityMap {
    tables: BTreeMap<String, MappingTable>,
    meta: MapMeta,
}

impl CapabilityMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// The map compiled into this crate
    pub fn builtin() -> ConvResult<Self> {
        Self::from_toml(BUILTIN_MAP)
    }

    /// Load a map from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ConvResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load a map from a TOML string
    pub fn from_toml(text: &str) -> ConvResult<Self> {
        let file: MapFile = toml::from_str(text)?;
        Ok(Self {
            tables: file.maps,
            meta: file.meta.unwrap_or_default(),
        })
    }

    /// Table for a driver and vehicle type, falling back to the driver table
    pub fn resolve(&self, driver: &str, vehicle_type: VehicleType) -> Option<&MappingTable> {
        self.tables
            .get(&table_key(driver, vehicle_type))
            .or_else(|| self.tables.get(driver))
    }

    /// Capability names of the resolved table, empty when there is none
    pub fn capabilities(&self, driver: &str, vehicle_type: VehicleType) -> Vec<String> {
        self.resolve(driver, vehicle_type)
            .map(|table| table.capabilities().map(String::from).collect())
            .unwrap_or_default()
    }

    pub fn meta(&self) -> &MapMeta {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Key of the type-specific table
pub fn table_key(driver: &str, vehicle_type: VehicleType) -> String {
    format!("{}-{}", driver, vehicle_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MAP: &str = r#"
[meta]
name = "test"

[maps.car]
measure_battery = "status.battery.soc"
is_home = { latitude = "position.lat", longitude = "position.lng" }

[maps.car-skodae]
measure_battery = "status.charging.battery.stateOfChargeInPercent"
"#;

    #[test]
    fn resolves_type_table_before_driver_table() {
        let map = CapabilityMap::from_toml(MAP).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.meta().name.as_deref(), Some("test"));

        let skoda = map.resolve("car", VehicleType::Skodae).unwrap();
        assert_eq!(
            skoda.get("measure_battery"),
            Some(&PathSpec::key("status.charging.battery.stateOfChargeInPercent"))
        );

        let legacy = map.resolve("car", VehicleType::Legacy).unwrap();
        assert_eq!(
            legacy.get("is_home"),
            Some(&PathSpec::location("position.lat", "position.lng"))
        );

        assert!(map.resolve("bike", VehicleType::Id).is_none());
        assert!(map.capabilities("bike", VehicleType::Id).is_empty());
    }

    #[test]
    fn keeps_map_file_order() {
        let map = CapabilityMap::from_toml(
            r#"
[maps.car]
measure_range = "status.range"
is_plug_connected = "status.plug"
locked = "status.locked"
is_home = { latitude = "position.lat", longitude = "position.lng" }
measure_battery = "status.soc"
"#,
        )
        .unwrap();

        assert_eq!(
            map.capabilities("car", VehicleType::Id),
            vec!["measure_range", "is_plug_connected", "locked", "is_home", "measure_battery"]
        );
    }

    #[test]
    fn repeated_capability_replaces_in_place() {
        let table: MappingTable = [
            ("locked".to_string(), PathSpec::key("a")),
            ("measure_battery".to_string(), PathSpec::key("b")),
            ("locked".to_string(), PathSpec::key("c")),
        ]
        .into_iter()
        .collect();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("locked"), Some(&PathSpec::key("c")));
        assert_eq!(
            table.capabilities().collect::<Vec<_>>(),
            vec!["locked", "measure_battery"]
        );
    }

    #[test]
    fn builtin_map_parses() {
        let map = CapabilityMap::builtin().unwrap();
        for ty in [
            VehicleType::Id,
            VehicleType::Audietron,
            VehicleType::Skodae,
            VehicleType::Legacy,
        ] {
            let caps = map.capabilities("car", ty);
            assert!(caps.contains(&"measure_battery".to_string()), "{ty}");
            assert!(caps.contains(&"is_home".to_string()), "{ty}");
        }
    }
}
