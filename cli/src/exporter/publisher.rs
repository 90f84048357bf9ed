use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use power_exporter_platform::{BatteryMetrics, BatterySource, DeviceId};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::exporter::store::MetricStore;
use crate::sinks::PushSink;

/// A battery that was read successfully during a tick.
#[derive(Debug, Clone)]
pub struct DeviceSample {
    pub device: DeviceId,
    /// Raw `POWER_SUPPLY_STATUS` text.
    pub status: String,
    pub metrics: BatteryMetrics,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub samples: Vec<DeviceSample>,
    pub failed: Vec<DeviceId>,
}

/// Drives sampling: read every battery, update the store, then hand the
/// result to each push sink.
pub struct Publisher {
    source: Arc<dyn BatterySource>,
    store: Arc<MetricStore>,
    sinks: Vec<Box<dyn PushSink>>,
}

impl Publisher {
    pub fn new(source: Arc<dyn BatterySource>, store: Arc<MetricStore>) -> Self {
        Self {
            source,
            store,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn PushSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// One sampling pass. Blocking: reads sysfs and performs sink I/O.
    ///
    /// A battery that cannot be read keeps its previous values in the store.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        for device in self.store.devices() {
            match self.source.read(device) {
                Ok(reading) => {
                    let metrics = BatteryMetrics::derive(&reading);
                    self.store.record(device, &metrics);
                    report.samples.push(DeviceSample {
                        device: device.clone(),
                        status: reading.status,
                        metrics,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    warn!(device = %device, error = %e, "Failed to read battery");
                    report.failed.push(device.clone());
                }
            }
        }

        self.flush(&report);
        report
    }

    fn flush(&self, report: &TickReport) {
        for sink in &self.sinks {
            let started = Instant::now();
            match sink.push(report, &self.store) {
                Ok(()) => debug!(
                    sink = sink.name(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Published metrics"
                ),
                Err(e) => error!(sink = sink.name(), error = %e, "Failed to publish metrics"),
            }
        }
    }

    /// Samples immediately, then once per `interval`, until `shutdown`
    /// becomes true or its sender is dropped. Shutdown is only observed
    /// between ticks.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut tick_count: u64 = 0;

        info!(
            interval_secs = interval.as_secs(),
            devices = self.store.devices().len(),
            sinks = ?self.sink_names(),
            "Publish loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tick.tick() => {
                    let publisher = Arc::clone(&self);
                    let started = Instant::now();
                    match tokio::task::spawn_blocking(move || publisher.tick()).await {
                        Ok(report) => {
                            tick_count += 1;
                            debug!(
                                tick = tick_count,
                                sampled = report.samples.len(),
                                failed = report.failed.len(),
                                duration_ms = started.elapsed().as_millis() as u64,
                                "Tick completed"
                            );
                        }
                        Err(e) => error!(error = %e, "Tick panicked"),
                    }
                }
            }
        }

        info!(ticks = tick_count, "Publish loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use power_exporter_platform::{RawReading, ReadError};

    use super::*;
    use crate::exporter::store::MetricName;
    use crate::sinks::SinkError;

    /// In-memory batteries whose readings can be swapped or broken between ticks.
    #[derive(Default)]
    struct FakeSource {
        readings: Mutex<HashMap<DeviceId, Option<RawReading>>>,
        reads: Mutex<usize>,
    }

    impl FakeSource {
        fn with(devices: &[(&str, i64)]) -> Self {
            let source = FakeSource::default();
            for (name, capacity) in devices {
                source.set(name, *capacity);
            }
            source
        }

        fn set(&self, name: &str, capacity: i64) {
            let reading = RawReading {
                status: "Discharging".to_string(),
                capacity,
                voltage_now: 12_000_000,
                ..Default::default()
            };
            self.readings
                .lock()
                .unwrap()
                .insert(DeviceId::from(name), Some(reading));
        }

        fn break_device(&self, name: &str) {
            self.readings
                .lock()
                .unwrap()
                .insert(DeviceId::from(name), None);
        }

        fn reads(&self) -> usize {
            *self.reads.lock().unwrap()
        }
    }

    impl BatterySource for FakeSource {
        fn devices(&self) -> Vec<DeviceId> {
            let mut devices: Vec<_> = self.readings.lock().unwrap().keys().cloned().collect();
            devices.sort();
            devices
        }

        fn read(&self, device: &DeviceId) -> Result<RawReading, ReadError> {
            *self.reads.lock().unwrap() += 1;
            match self.readings.lock().unwrap().get(device) {
                Some(Some(reading)) => Ok(reading.clone()),
                _ => Err(ReadError::Io {
                    path: format!("/fake/{}/uevent", device).into(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                }),
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        pushes: Arc<Mutex<Vec<usize>>>,
        fail: bool,
    }

    impl PushSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn push(&self, report: &TickReport, _store: &MetricStore) -> Result<(), SinkError> {
            self.pushes.lock().unwrap().push(report.samples.len());
            if self.fail {
                return Err(SinkError::Encode(prometheus::Error::Msg("boom".to_string())));
            }
            Ok(())
        }
    }

    fn publisher(source: Arc<FakeSource>) -> (Publisher, Arc<MetricStore>) {
        let store = Arc::new(MetricStore::new(&source.devices()).unwrap());
        (Publisher::new(source, Arc::clone(&store)), store)
    }

    #[test]
    fn test_tick_writes_every_device() {
        let source = Arc::new(FakeSource::with(&[("BAT0", 80), ("BAT1", 55)]));
        let (publisher, store) = publisher(Arc::clone(&source));

        let report = publisher.tick();

        assert_eq!(report.samples.len(), 2);
        assert!(report.failed.is_empty());
        assert_eq!(report.samples[0].status, "Discharging");
        assert_eq!(
            store.get(MetricName::Percentage, &DeviceId::from("BAT0")),
            Some(80.0)
        );
        assert_eq!(
            store.get(MetricName::Percentage, &DeviceId::from("BAT1")),
            Some(55.0)
        );
        assert_eq!(
            store.get(MetricName::Voltage, &DeviceId::from("BAT1")),
            Some(12.0)
        );
    }

    #[test]
    fn test_failed_read_keeps_previous_values() {
        let source = Arc::new(FakeSource::with(&[("BAT0", 80), ("BAT1", 55)]));
        let (publisher, store) = publisher(Arc::clone(&source));
        publisher.tick();

        source.break_device("BAT0");
        source.set("BAT1", 54);
        let report = publisher.tick();

        assert_eq!(report.failed, vec![DeviceId::from("BAT0")]);
        assert_eq!(report.samples.len(), 1);
        assert_eq!(
            store.get(MetricName::Percentage, &DeviceId::from("BAT0")),
            Some(80.0)
        );
        assert_eq!(
            store.get(MetricName::Percentage, &DeviceId::from("BAT1")),
            Some(54.0)
        );
        assert!(store
            .encode_text()
            .unwrap()
            .contains("battery_percentage{battery=\"BAT0\"} 80"));
    }

    #[test]
    fn test_sinks_run_after_devices_and_failures_do_not_stop_others() {
        let source = Arc::new(FakeSource::with(&[("BAT0", 80), ("BAT1", 55)]));
        let (publisher, _store) = publisher(Arc::clone(&source));
        let failing = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let healthy = RecordingSink::default();
        let publisher = publisher
            .with_sink(Box::new(failing.clone()))
            .with_sink(Box::new(healthy.clone()));

        source.break_device("BAT1");
        publisher.tick();
        publisher.tick();

        assert_eq!(*failing.pushes.lock().unwrap(), vec![1, 1]);
        assert_eq!(*healthy.pushes.lock().unwrap(), vec![1, 1]);
        assert_eq!(publisher.sink_names(), vec!["recording", "recording"]);
    }

    #[tokio::test]
    async fn test_run_samples_immediately_and_stops_on_shutdown() {
        let source = Arc::new(FakeSource::with(&[("BAT0", 70)]));
        let (publisher, store) = publisher(Arc::clone(&source));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(Arc::new(publisher).run(Duration::from_secs(3600), rx));

        let deadline = Instant::now() + Duration::from_secs(5);
        while source.reads() == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(source.reads(), 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop should stop after shutdown")
            .unwrap();

        assert_eq!(source.reads(), 1);
        assert_eq!(
            store.get(MetricName::Percentage, &DeviceId::from("BAT0")),
            Some(70.0)
        );
    }

    #[tokio::test]
    async fn test_run_stops_when_sender_dropped() {
        let source = Arc::new(FakeSource::with(&[("BAT0", 70)]));
        let (publisher, _store) = publisher(source);
        let (tx, rx) = watch::channel(false);
        drop(tx);

        tokio::time::timeout(
            Duration::from_secs(5),
            Arc::new(publisher).run(Duration::from_millis(10), rx),
        )
        .await
        .expect("loop should stop once the shutdown sender is gone");
    }

    #[tokio::test]
    async fn test_run_keeps_ticking() {
        let source = Arc::new(FakeSource::with(&[("BAT0", 70)]));
        let (publisher, _store) = publisher(Arc::clone(&source));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(Arc::new(publisher).run(Duration::from_millis(20), rx));

        let deadline = Instant::now() + Duration::from_secs(5);
        while source.reads() < 3 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(source.reads() >= 3);
    }
}
