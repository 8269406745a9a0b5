//! Rounding helpers
//!
//! Temperatures are reported in half degrees, with halves rounded toward
//! positive infinity (`-0.5` rounds to `0`, `0.5` rounds to `1`).

/// Round to the nearest integer, halves toward +∞
///
/// `f64::round` rounds halves away from zero, which differs for negative
/// halves: `(-2.5).round() == -3` but `round_half_up(-2.5) == -2`.
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Round to the nearest half, halves toward +∞
///
/// # Examples
/// - 26.85 → 27.0
/// - 0.05 → 0.0
/// - -1.3 → -1.5
pub fn round_to_half(value: f64) -> f64 {
    round_half_up(value * 2.0) / 2.0
}
