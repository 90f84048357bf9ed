//! Current battery gauges, shared by the publish loop and every sink.
//!
//! Each (metric, battery) series is its own atomic gauge, so the publish loop
//! can update one value while a scrape is encoding the rest without a
//! store-wide lock. The battery set is fixed when the store is built.

use std::collections::HashMap;

use power_exporter_platform::{BatteryMetrics, DeviceId};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};

pub const DEVICE_LABEL: &str = "battery";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    Percentage,
    CapacityHealth,
    Charging,
    Voltage,
    Energy,
    CycleCount,
}

impl MetricName {
    pub const ALL: [MetricName; 6] = [
        MetricName::Percentage,
        MetricName::CapacityHealth,
        MetricName::Charging,
        MetricName::Voltage,
        MetricName::Energy,
        MetricName::CycleCount,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MetricName::Percentage => "battery_percentage",
            MetricName::CapacityHealth => "battery_capacity_percent",
            MetricName::Charging => "battery_charging",
            MetricName::Voltage => "battery_voltage_volts",
            MetricName::Energy => "battery_energy_wh",
            MetricName::CycleCount => "battery_cycle_count",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            MetricName::Percentage => "Battery charge percentage",
            MetricName::CapacityHealth => "Battery health/capacity compared to design",
            MetricName::Charging => {
                "0 if discharging or unknown, 1 if charging, 2 if full, 3 if not charging"
            }
            MetricName::Voltage => "Current battery voltage in volts",
            MetricName::Energy => "Current energy in Wh",
            MetricName::CycleCount => "Battery cycle count",
        }
    }

    fn index(&self) -> usize {
        match self {
            MetricName::Percentage => 0,
            MetricName::CapacityHealth => 1,
            MetricName::Charging => 2,
            MetricName::Voltage => 3,
            MetricName::Energy => 4,
            MetricName::CycleCount => 5,
        }
    }
}

pub struct MetricStore {
    registry: Registry,
    devices: Vec<DeviceId>,
    series: HashMap<DeviceId, Vec<Gauge>>,
}

impl MetricStore {
    /// Registers every gauge and creates every (metric, battery) series up
    /// front, so a known battery never has a missing series.
    pub fn new(devices: &[DeviceId]) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let mut vecs = Vec::with_capacity(MetricName::ALL.len());
        for metric in MetricName::ALL {
            let vec = GaugeVec::new(Opts::new(metric.name(), metric.help()), &[DEVICE_LABEL])?;
            registry.register(Box::new(vec.clone()))?;
            vecs.push(vec);
        }

        let mut unique = Vec::with_capacity(devices.len());
        let mut series = HashMap::with_capacity(devices.len());
        for device in devices {
            if series.contains_key(device) {
                continue;
            }
            let gauges = vecs
                .iter()
                .map(|vec| vec.get_metric_with_label_values(&[device.as_str()]))
                .collect::<Result<Vec<_>, _>>()?;
            series.insert(device.clone(), gauges);
            unique.push(device.clone());
        }

        Ok(Self {
            registry,
            devices: unique,
            series,
        })
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    /// Sets one value. Returns false for a battery the store was not built
    /// with; such writes are dropped.
    pub fn set(&self, metric: MetricName, device: &DeviceId, value: f64) -> bool {
        match self.series.get(device) {
            Some(gauges) => {
                gauges[metric.index()].set(value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, metric: MetricName, device: &DeviceId) -> Option<f64> {
        self.series
            .get(device)
            .map(|gauges| gauges[metric.index()].get())
    }

    pub fn record(&self, device: &DeviceId, metrics: &BatteryMetrics) -> bool {
        let Some(gauges) = self.series.get(device) else {
            return false;
        };

        gauges[MetricName::Percentage.index()].set(metrics.percentage);
        gauges[MetricName::CapacityHealth.index()].set(metrics.capacity_health);
        gauges[MetricName::Charging.index()].set(f64::from(metrics.charging_code()));
        gauges[MetricName::Voltage.index()].set(metrics.voltage_volts);
        gauges[MetricName::Energy.index()].set(metrics.energy_wh);
        gauges[MetricName::CycleCount.index()].set(metrics.cycle_count as f64);
        true
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Current values in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
