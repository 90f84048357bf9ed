//! Normalised metrics derived from a raw reading.

use serde::Serialize;

use crate::battery::RawReading;
use crate::types::ChargeState;

const MICRO: f64 = 1_000_000.0;

/// Unit-consistent values for one battery at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatteryMetrics {
    /// Charge level (0-100), passed through from `POWER_SUPPLY_CAPACITY`.
    pub percentage: f64,

    /// Full-charge capacity relative to design capacity, in percent.
    /// Not clamped: a stale design value can push this above 100.
    pub capacity_health: f64,

    pub state: ChargeState,

    pub voltage_volts: f64,

    /// Energy currently stored, in watt-hours.
    pub energy_wh: f64,

    pub cycle_count: i64,
}

impl BatteryMetrics {
    pub fn derive(reading: &RawReading) -> Self {
        let capacity_health = if reading.energy_full_design > 0 {
            100.0 * reading.energy_full as f64 / reading.energy_full_design as f64
        } else {
            100.0
        };

        Self {
            percentage: reading.capacity as f64,
            capacity_health,
            state: ChargeState::from_status(&reading.status),
            voltage_volts: reading.voltage_now as f64 / MICRO,
            energy_wh: reading.energy_now as f64 / MICRO,
            cycle_count: reading.cycle_count,
        }
    }

    pub fn charging_code(&self) -> u8 {
        self.state.code()
    }
}
