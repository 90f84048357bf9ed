//! Battery readings and the source trait they come from.

use std::fmt;

use serde::Serialize;

use crate::error::ReadError;

/// Name of a battery in the power-supply namespace (e.g. `BAT0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One battery's attributes at a single sampling instant.
///
/// Energies are in µWh and voltage in µV, exactly as the kernel reports them.
/// Numeric attributes that are missing or malformed are zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawReading {
    pub status: String,
    pub present: bool,
    pub technology: String,
    pub cycle_count: i64,
    pub voltage_now: i64,
    pub energy_now: i64,
    pub energy_full: i64,
    pub energy_full_design: i64,
    /// Charge level as a percentage (0-100).
    pub capacity: i64,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub serial: Option<String>,
}

impl RawReading {
    /// Parses the contents of a `uevent` file.
    ///
    /// Lines are `KEY=VALUE` in any order. Lines without `=` and unknown keys
    /// are skipped. A value that does not parse as an integer contributes
    /// zero for that field only.
    pub fn parse(content: &str) -> Self {
        let mut reading = RawReading::default();

        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            match key {
                "POWER_SUPPLY_STATUS" => reading.status = value.to_string(),
                "POWER_SUPPLY_PRESENT" => reading.present = value == "1",
                "POWER_SUPPLY_TECHNOLOGY" => reading.technology = value.to_string(),
                "POWER_SUPPLY_CYCLE_COUNT" => reading.cycle_count = parse_int(value),
                "POWER_SUPPLY_VOLTAGE_NOW" => reading.voltage_now = parse_int(value),
                "POWER_SUPPLY_ENERGY_NOW" => reading.energy_now = parse_int(value),
                "POWER_SUPPLY_ENERGY_FULL" => reading.energy_full = parse_int(value),
                "POWER_SUPPLY_ENERGY_FULL_DESIGN" => {
                    reading.energy_full_design = parse_int(value)
                }
                "POWER_SUPPLY_CAPACITY" => reading.capacity = parse_int(value),
                "POWER_SUPPLY_MODEL_NAME" => reading.model = Some(value.to_string()),
                "POWER_SUPPLY_MANUFACTURER" => reading.manufacturer = Some(value.to_string()),
                "POWER_SUPPLY_SERIAL_NUMBER" => reading.serial = Some(value.to_string()),
                _ => {}
            }
        }

        reading
    }
}

fn parse_int(value: &str) -> i64 {
    value.parse().unwrap_or(0)
}

/// A place batteries can be discovered and read from.
pub trait BatterySource: Send + Sync {
    /// Lists the batteries this source exposes. Never fails; an unreadable
    /// source yields an empty list.
    fn devices(&self) -> Vec<DeviceId>;

    /// Reads the current attributes of one battery.
    fn read(&self, device: &DeviceId) -> Result<RawReading, ReadError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const THINKPAD_UEVENT: &str = "\
POWER_SUPPLY_NAME=BAT0
POWER_SUPPLY_TYPE=Battery
POWER_SUPPLY_STATUS=Discharging
POWER_SUPPLY_PRESENT=1
POWER_SUPPLY_TECHNOLOGY=Li-poly
POWER_SUPPLY_CYCLE_COUNT=312
POWER_SUPPLY_VOLTAGE_MIN_DESIGN=11580000
POWER_SUPPLY_VOLTAGE_NOW=12300000
POWER_SUPPLY_POWER_NOW=7452000
POWER_SUPPLY_ENERGY_FULL_DESIGN=57000000
POWER_SUPPLY_ENERGY_FULL=50160000
POWER_SUPPLY_ENERGY_NOW=45000000
POWER_SUPPLY_CAPACITY=89
POWER_SUPPLY_CAPACITY_LEVEL=Normal
POWER_SUPPLY_MODEL_NAME=5B10W13930
POWER_SUPPLY_MANUFACTURER=SMP
POWER_SUPPLY_SERIAL_NUMBER= 1234
";

    #[test]
    fn test_parse_full_uevent() {
        let reading = RawReading::parse(THINKPAD_UEVENT);

        assert_eq!(
            reading,
            RawReading {
                status: "Discharging".to_string(),
                present: true,
                technology: "Li-poly".to_string(),
                cycle_count: 312,
                voltage_now: 12_300_000,
                energy_now: 45_000_000,
                energy_full: 50_160_000,
                energy_full_design: 57_000_000,
                capacity: 89,
                model: Some("5B10W13930".to_string()),
                manufacturer: Some("SMP".to_string()),
                serial: Some(" 1234".to_string()),
            }
        );
    }

    #[test]
    fn test_malformed_number_only_zeroes_that_field() {
        let content = "POWER_SUPPLY_CYCLE_COUNT=abc\n\
                       POWER_SUPPLY_CAPACITY=55\n\
                       POWER_SUPPLY_STATUS=Charging\n\
                       POWER_SUPPLY_VOLTAGE_NOW=12300000\n";
        let reading = RawReading::parse(content);

        assert_eq!(reading.cycle_count, 0);
        assert_eq!(reading.capacity, 55);
        assert_eq!(reading.status, "Charging");
        assert_eq!(reading.voltage_now, 12_300_000);
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let a = RawReading::parse("POWER_SUPPLY_CAPACITY=40\nPOWER_SUPPLY_STATUS=Full\n");
        let b = RawReading::parse("POWER_SUPPLY_STATUS=Full\nPOWER_SUPPLY_CAPACITY=40\n");
        assert_eq!(a, b);
    }

    #[test]
    fn test_lines_without_separator_are_skipped() {
        let reading = RawReading::parse("garbage line\n\nPOWER_SUPPLY_CAPACITY=12\n");
        assert_eq!(reading.capacity, 12);
    }

    #[test]
    fn test_value_keeps_text_after_first_separator() {
        let reading = RawReading::parse("POWER_SUPPLY_MODEL_NAME=A=B\n");
        assert_eq!(reading.model.as_deref(), Some("A=B"));
    }

    #[test]
    fn test_missing_fields_default() {
        let reading = RawReading::parse("");
        assert_eq!(reading, RawReading::default());
        assert!(!reading.present);
        assert!(reading.model.is_none());
    }

    #[test]
    fn test_present_requires_exact_one() {
        assert!(!RawReading::parse("POWER_SUPPLY_PRESENT=0").present);
        assert!(!RawReading::parse("POWER_SUPPLY_PRESENT=yes").present);
        assert!(RawReading::parse("POWER_SUPPLY_PRESENT=1").present);
    }
}
