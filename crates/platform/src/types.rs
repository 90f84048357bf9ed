//! Shared types for battery monitoring.

use std::fmt;

use serde::Serialize;

/// Battery charging state, as reported in `POWER_SUPPLY_STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ChargeState {
    /// Battery is actively charging
    Charging,
    /// Battery is discharging (on battery power)
    Discharging,
    /// Battery is full
    Full,
    /// External power connected but not charging (e.g., charge limit reached)
    NotCharging,
    /// State cannot be determined
    #[default]
    Unknown,
}

impl ChargeState {
    /// Maps a raw sysfs status string. Matching is exact and case-sensitive;
    /// anything unrecognised is `Unknown`.
    pub fn from_status(status: &str) -> Self {
        match status {
            "Charging" => ChargeState::Charging,
            "Discharging" => ChargeState::Discharging,
            "Full" => ChargeState::Full,
            "Not charging" => ChargeState::NotCharging,
            _ => ChargeState::Unknown,
        }
    }

    /// Numeric code exported as the `battery_charging` gauge.
    ///
    /// `Discharging` and `Unknown` share code 0.
    pub fn code(&self) -> u8 {
        match self {
            ChargeState::Charging => 1,
            ChargeState::Full => 2,
            ChargeState::NotCharging => 3,
            ChargeState::Discharging | ChargeState::Unknown => 0,
        }
    }

    /// Returns the status string as the kernel spells it.
    pub fn label(&self) -> &'static str {
        match self {
            ChargeState::Charging => "Charging",
            ChargeState::Discharging => "Discharging",
            ChargeState::Full => "Full",
            ChargeState::NotCharging => "Not charging",
            ChargeState::Unknown => "Unknown",
        }
    }

    /// Returns true if external power is connected.
    pub fn is_plugged_in(&self) -> bool {
        matches!(
            self,
            ChargeState::Charging | ChargeState::Full | ChargeState::NotCharging
        )
    }
}

impl fmt::Display for ChargeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
