//! Unit and enum conversions for raw telemetry values
//!
//! The rules are keyed on substrings of the capability name, so one rule set
//! covers every vehicle type:
//!
//! | capability contains      | raw value        | result                          |
//! |--------------------------|------------------|---------------------------------|
//! | `_temperature`           | > 2000           | tenths of Kelvin → °C, half steps |
//! | `_temperature`           | > 200            | Kelvin → °C, half steps         |
//! | `_range`                 | > 2000           | meters → km                     |
//! | `remaining_climate_time` | any (`skodae`)   | seconds → minutes               |
//! | anything else            | number           | absolute value                  |
//! | `_plug_connected`        | connected/disconnected | bool                      |
//! | `is_charging`            | charging/off     | bool                            |

use serde_json::Value;
use vehsync_core::{CapabilityValue, VehicleType};

use crate::precision::round_to_half;

const KELVIN_OFFSET: f64 = 273.15;

/// Raw temperatures above this are tenths of Kelvin
const DECI_KELVIN_THRESHOLD: f64 = 2000.0;
/// Raw temperatures above this (and not above the previous) are Kelvin
const KELVIN_THRESHOLD: f64 = 200.0;
/// Raw ranges above this are meters
const METER_THRESHOLD: f64 = 2000.0;

/// Normalize one raw telemetry value for a capability.
///
/// Returns `None` when the raw value is `null`, which leaves the capability
/// untouched for this cycle.
pub fn normalize(capability: &str, raw: &Value, vehicle_type: VehicleType) -> Option<CapabilityValue> {
    match raw {
        Value::Null => None,
        Value::Number(n) => n
            .as_f64()
            .map(|n| CapabilityValue::Number(normalize_number(capability, n, vehicle_type))),
        Value::String(s) => Some(normalize_text(capability, s)),
        other => CapabilityValue::from_json(other),
    }
}

/// Apply the numeric unit rules
pub fn normalize_number(capability: &str, raw: f64, vehicle_type: VehicleType) -> f64 {
    if capability.contains("_temperature") && raw > DECI_KELVIN_THRESHOLD {
        round_to_half(raw / 10.0 - KELVIN_OFFSET)
    } else if capability.contains("_temperature") && raw > KELVIN_THRESHOLD {
        round_to_half(raw - KELVIN_OFFSET)
    } else if capability.contains("_range") && raw > METER_THRESHOLD {
        raw / 1000.0
    } else if capability.contains("remaining_climate_time") && vehicle_type == VehicleType::Skodae {
        raw / 60.0
    } else {
        raw.abs()
    }
}

/// Apply the enum-to-boolean rules; unrecognized strings pass through
pub fn normalize_text(capability: &str, raw: &str) -> CapabilityValue {
    let flag = if capability.contains("_plug_connected") {
        match_flag(raw, "connected", "disconnected")
    } else if capability.contains("is_charging") {
        match_flag(raw, "charging", "off")
    } else {
        None
    };

    match flag {
        Some(b) => CapabilityValue::Bool(b),
        None => CapabilityValue::Text(raw.to_string()),
    }
}

fn match_flag(raw: &str, on: &str, off: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case(on) {
        Some(true)
    } else if raw.eq_ignore_ascii_case(off) {
        Some(false)
    } else {
        None
    }
}
