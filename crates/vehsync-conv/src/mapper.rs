//! State mapper - telemetry snapshot → capability values

use serde_json::Value;
use vehsync_core::models::lookup;
use vehsync_core::{CapabilityValue, GeoPoint, TelemetrySnapshot, VehicleType, IS_HOME};

use crate::definition::PathSpec;
use crate::error::ConvError;
use crate::geo;
use crate::normalize::normalize;
use crate::store::MappingTable;

/// Result of one mapping pass
///
/// Values are listed in table order. A failing entry lands in `errors` and
/// does not stop the remaining entries.
#[derive(Debug, Default)]
pub struct MappingOutcome {
    pub values: Vec<(String, CapabilityValue)>,
    pub errors: Vec<ConvError>,
}

impl MappingOutcome {
    pub fn get(&self, capability: &str) -> Option<&CapabilityValue> {
        self.values
            .iter()
            .find(|(name, _)| name == capability)
            .map(|(_, value)| value)
    }
}

/// Maps a vehicle's telemetry through one mapping table
#[derive(Debug, Clone, Copy)]
pub struct StateMapper<'a> {
    table: &'a MappingTable,
    vehicle_type: VehicleType,
    home: GeoPoint,
}

impl<'a> StateMapper<'a> {
    pub fn new(table: &'a MappingTable, vehicle_type: VehicleType, home: GeoPoint) -> Self {
        Self {
            table,
            vehicle_type,
            home,
        }
    }

    /// Map one vehicle of a snapshot.
    ///
    /// Returns `None` while the backend has not delivered status data for
    /// `vin`; the cycle is then skipped.
    pub fn map_snapshot(&self, snapshot: &TelemetrySnapshot, vin: &str) -> Option<MappingOutcome> {
        snapshot.vehicle_with_status(vin).map(|vehicle| self.map(vehicle))
    }

    /// Map a vehicle entry (the subtree below its VIN)
    pub fn map(&self, vehicle: &Value) -> MappingOutcome {
        let mut outcome = MappingOutcome::default();

        for (capability, spec) in self.table {
            match self.map_entry(capability, spec, vehicle) {
                Ok(Some(value)) => outcome.values.push(value),
                Ok(None) => {}
                Err(e) => outcome.errors.push(e),
            }
        }

        outcome
    }

    fn map_entry(
        &self,
        capability: &str,
        spec: &PathSpec,
        vehicle: &Value,
    ) -> Result<Option<(String, CapabilityValue)>, ConvError> {
        let location = capability.contains(IS_HOME);

        match spec {
            PathSpec::Location {
                latitude,
                longitude,
            } if location => {
                let lat = coordinate(capability, vehicle, latitude)?;
                let lng = coordinate(capability, vehicle, longitude)?;
                let position = geo::from_micro_degrees(lat, lng);
                let home = geo::is_home(self.home, position);
                Ok(Some((IS_HOME.to_string(), CapabilityValue::Bool(home))))
            }
            PathSpec::Location { .. } => Err(ConvError::InvalidMapping {
                capability: capability.to_string(),
                message: "location path on a non-location capability".to_string(),
            }),
            PathSpec::Key(_) if location => Err(ConvError::InvalidMapping {
                capability: capability.to_string(),
                message: "location capability needs latitude and longitude paths".to_string(),
            }),
            PathSpec::Key(path) => Ok(lookup(vehicle, path)
                .and_then(|raw| normalize(capability, raw, self.vehicle_type))
                .map(|value| (capability.to_string(), value))),
        }
    }
}

/// Read a coordinate in micro-degrees; a missing coordinate counts as 0
fn coordinate(capability: &str, vehicle: &Value, path: &str) -> Result<f64, ConvError> {
    match lookup(vehicle, path) {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(capability, path)),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid(capability, path)),
        Some(_) => Err(invalid(capability, path)),
    }
}

fn invalid(capability: &str, path: &str) -> ConvError {
    ConvError::InvalidValue {
        capability: capability.to_string(),
        message: format!("coordinate at '{}' is not numeric", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn table() -> MappingTable {
        [
            ("measure_battery", PathSpec::key("status.battery.soc")),
            ("measure_range", PathSpec::key("status.range.total")),
            ("measure_temperature", PathSpec::key("status.climate.outside")),
            ("is_plug_connected", PathSpec::key("status.plug.state")),
            ("measure_mileage", PathSpec::key("status.odometer")),
            (
                "is_home",
                PathSpec::location("position.lat", "position.lng"),
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn maps_and_normalizes_values() {
        let table = table();
        let mapper = StateMapper::new(&table, VehicleType::Id, GeoPoint::default());
        let vehicle = json!({
            "status": {
                "battery": { "soc": 80 },
                "range": { "total": 15000 },
                "climate": { "outside": 2732 },
                "plug": { "state": "disconnected" },
                "odometer": null
            },
            "position": { "lat": 500, "lng": 500 }
        });

        let outcome = mapper.map(&vehicle);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.get("measure_battery"), Some(&CapabilityValue::Number(80.0)));
        assert_eq!(outcome.get("measure_range"), Some(&CapabilityValue::Number(15.0)));
        assert_eq!(outcome.get("measure_temperature"), Some(&CapabilityValue::Number(0.0)));
        assert_eq!(outcome.get("is_plug_connected"), Some(&CapabilityValue::Bool(false)));
        assert_eq!(outcome.get("is_home"), Some(&CapabilityValue::Bool(true)));
        // null is skipped
        assert_eq!(outcome.get("measure_mileage"), None);
        assert_eq!(
            outcome
                .values
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>(),
            vec![
                "measure_battery",
                "measure_range",
                "measure_temperature",
                "is_plug_connected",
                "is_home"
            ]
        );
    }

    #[test]
    fn missing_position_defaults_to_origin() {
        let table = table();
        let far = StateMapper::new(&table, VehicleType::Id, GeoPoint::new(1.0, 0.0));
        let home = StateMapper::new(&table, VehicleType::Id, GeoPoint::default());
        let vehicle = json!({ "status": {} });

        assert_eq!(far.map(&vehicle).get("is_home"), Some(&CapabilityValue::Bool(false)));
        assert_eq!(home.map(&vehicle).get("is_home"), Some(&CapabilityValue::Bool(true)));
    }

    #[test]
    fn bad_coordinate_does_not_stop_the_pass() {
        let table = table();
        let mapper = StateMapper::new(&table, VehicleType::Id, GeoPoint::default());
        let vehicle = json!({
            "status": { "battery": { "soc": 55 } },
            "position": { "lat": "north", "lng": 0 }
        });

        let outcome = mapper.map(&vehicle);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].capability(), Some("is_home"));
        assert_eq!(outcome.get("measure_battery"), Some(&CapabilityValue::Number(55.0)));
    }

    #[test]
    fn location_capability_needs_location_path() {
        let table: MappingTable = [("is_home".to_string(), PathSpec::key("position"))]
            .into_iter()
            .collect();
        let mapper = StateMapper::new(&table, VehicleType::Id, GeoPoint::default());
        let outcome = mapper.map(&json!({ "status": {} }));
        assert!(matches!(
            outcome.errors.as_slice(),
            [ConvError::InvalidMapping { .. }]
        ));
    }

    #[test]
    fn snapshot_without_status_is_skipped() {
        let table = table();
        let mapper = StateMapper::new(&table, VehicleType::Id, GeoPoint::default());
        let snapshot = TelemetrySnapshot::new(json!({ "VIN1": { "position": {} } }));
        assert!(mapper.map_snapshot(&snapshot, "VIN1").is_none());
        assert!(mapper.map_snapshot(&snapshot, "VIN2").is_none());

        let snapshot = TelemetrySnapshot::from_flat([
            ("VIN1.status.battery.soc", json!(42)),
            ("VIN1.position.lat", json!(0)),
        ]);
        let outcome = mapper.map_snapshot(&snapshot, "VIN1").unwrap();
        assert_eq!(outcome.get("measure_battery"), Some(&CapabilityValue::Number(42.0)));
    }
}
