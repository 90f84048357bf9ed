use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::battery::{BatterySource, DeviceId, RawReading};
use crate::error::ReadError;

pub const POWER_SUPPLY_PATH: &str = "/sys/class/power_supply";

const BATTERY_PREFIX: &str = "BAT";
const UEVENT: &str = "uevent";

/// Batteries exposed through a `power_supply` sysfs class directory.
#[derive(Debug, Clone)]
pub struct SysfsPowerSupply {
    root: PathBuf,
}

impl SysfsPowerSupply {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_supported(&self) -> bool {
        self.root.exists()
    }

    fn uevent_path(&self, device: &DeviceId) -> PathBuf {
        self.root.join(device.as_str()).join(UEVENT)
    }
}

impl Default for SysfsPowerSupply {
    fn default() -> Self {
        Self::new(POWER_SUPPLY_PATH)
    }
}

impl BatterySource for SysfsPowerSupply {
    fn devices(&self) -> Vec<DeviceId> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                error!(path = %self.root.display(), error = %e, "Failed to read power supply directory");
                return Vec::new();
            }
        };

        let mut devices: Vec<DeviceId> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(BATTERY_PREFIX))
            .map(DeviceId::new)
            .filter(|device| {
                let exists = self.uevent_path(device).is_file();
                if !exists {
                    debug!(device = %device, "Skipping battery without uevent file");
                }
                exists
            })
            .collect();

        devices.sort();
        devices
    }

    fn read(&self, device: &DeviceId) -> Result<RawReading, ReadError> {
        let path = self.uevent_path(device);
        let content = fs::read_to_string(&path).map_err(|source| ReadError::Io { path, source })?;
        Ok(RawReading::parse(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn add_supply(root: &Path, name: &str, uevent: Option<&str>) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        if let Some(content) = uevent {
            fs::write(dir.join(UEVENT), content).unwrap();
        }
    }

    #[test]
    fn test_enumerates_batteries_only() {
        let tmp = TempDir::new().unwrap();
        add_supply(tmp.path(), "BAT1", Some("POWER_SUPPLY_CAPACITY=55\n"));
        add_supply(tmp.path(), "AC", Some("POWER_SUPPLY_ONLINE=1\n"));
        add_supply(tmp.path(), "BAT0", Some("POWER_SUPPLY_CAPACITY=80\n"));
        add_supply(tmp.path(), "hidpp_battery_0", Some("POWER_SUPPLY_CAPACITY=10\n"));

        let supply = SysfsPowerSupply::new(tmp.path());
        assert_eq!(
            supply.devices(),
            vec![DeviceId::from("BAT0"), DeviceId::from("BAT1")]
        );
    }

    #[test]
    fn test_skips_battery_without_uevent() {
        let tmp = TempDir::new().unwrap();
        add_supply(tmp.path(), "BAT0", None);
        add_supply(tmp.path(), "BAT1", Some("POWER_SUPPLY_CAPACITY=55\n"));

        let supply = SysfsPowerSupply::new(tmp.path());
        assert_eq!(supply.devices(), vec![DeviceId::from("BAT1")]);
    }

    #[test]
    fn test_no_batteries() {
        let tmp = TempDir::new().unwrap();
        add_supply(tmp.path(), "AC", Some("POWER_SUPPLY_ONLINE=1\n"));

        assert!(SysfsPowerSupply::new(tmp.path()).devices().is_empty());
    }

    #[test]
    fn test_unreadable_namespace_is_empty() {
        let tmp = TempDir::new().unwrap();
        let supply = SysfsPowerSupply::new(tmp.path().join("missing"));

        assert!(!supply.is_supported());
        assert!(supply.devices().is_empty());
    }

    #[test]
    fn test_read_parses_uevent() {
        let tmp = TempDir::new().unwrap();
        add_supply(
            tmp.path(),
            "BAT0",
            Some("POWER_SUPPLY_STATUS=Full\nPOWER_SUPPLY_CAPACITY=100\n"),
        );

        let reading = SysfsPowerSupply::new(tmp.path())
            .read(&DeviceId::from("BAT0"))
            .unwrap();
        assert_eq!(reading.status, "Full");
        assert_eq!(reading.capacity, 100);
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = SysfsPowerSupply::new(tmp.path())
            .read(&DeviceId::from("BAT7"))
            .unwrap_err();

        let ReadError::Io { path, source } = err;
        assert_eq!(path, tmp.path().join("BAT7").join(UEVENT));
        assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
    }
}
