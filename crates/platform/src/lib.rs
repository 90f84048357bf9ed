//! Battery discovery and sampling for power-exporter.
//!
//! This crate finds batteries in the Linux `power_supply` class, parses their
//! `uevent` attribute files, and turns the raw kernel values into normalised
//! metrics.
//!
//! # Example
//!
//! ```no_run
//! use power_exporter_platform::{BatteryMetrics, BatterySource, SysfsPowerSupply};
//!
//! let supply = SysfsPowerSupply::default();
//! for device in supply.devices() {
//!     let reading = supply.read(&device)?;
//!     let metrics = BatteryMetrics::derive(&reading);
//!     println!("{device}: {}%", metrics.percentage);
//! }
//! # Ok::<(), power_exporter_platform::ReadError>(())
//! ```

mod battery;
mod error;
mod metrics;
mod sysfs;
mod types;

pub use battery::{BatterySource, DeviceId, RawReading};
pub use error::ReadError;
pub use metrics::BatteryMetrics;
pub use sysfs::{SysfsPowerSupply, POWER_SUPPLY_PATH};
pub use types::ChargeState;
