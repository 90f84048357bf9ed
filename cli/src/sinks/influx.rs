use std::fmt::Write as _;

use tracing::debug;

use crate::config::InfluxConfig;
use crate::exporter::publisher::{DeviceSample, TickReport};
use crate::exporter::store::{MetricStore, DEVICE_LABEL};
use crate::sinks::{http_agent, PushSink, SinkError};

const MEASUREMENT: &str = "battery";

/// Writes one line-protocol point per sampled battery to an InfluxDB v2
/// bucket, batched into a single request per tick.
pub struct InfluxDb {
    agent: ureq::Agent,
    write_url: String,
    org: String,
    bucket: String,
    token: String,
    host: String,
}

impl InfluxDb {
    pub fn new(config: &InfluxConfig, host: &str) -> Self {
        Self {
            agent: http_agent(),
            write_url: format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token: config.token.clone(),
            host: host.to_string(),
        }
    }

    fn batch(&self, report: &TickReport) -> String {
        report
            .samples
            .iter()
            .map(|sample| line_protocol(&self.host, sample))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl PushSink for InfluxDb {
    fn name(&self) -> &'static str {
        "influxdb"
    }

    fn push(&self, report: &TickReport, _store: &MetricStore) -> Result<(), SinkError> {
        if report.samples.is_empty() {
            return Ok(());
        }

        let body = self.batch(report);
        self.agent
            .post(&self.write_url)
            .query("org", &self.org)
            .query("bucket", &self.bucket)
            .query("precision", "ns")
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .send(body.as_bytes())?;

        debug!(points = report.samples.len(), bucket = %self.bucket, "Wrote points to InfluxDB");
        Ok(())
    }
}

fn line_protocol(host: &str, sample: &DeviceSample) -> String {
    let m = &sample.metrics;
    let mut line = String::from(MEASUREMENT);

    // Tags in key order; InfluxDB rejects empty tag values.
    for (key, value) in [(DEVICE_LABEL, sample.device.as_str()), ("host", host)] {
        if !value.is_empty() {
            let _ = write!(line, ",{}={}", key, escape_tag(value));
        }
    }

    let _ = write!(
        line,
        " percentage={},capacity_health={},charging={},voltage={},energy_wh={},cycle_count={}i,status=\"{}\"",
        float_field(m.percentage),
        float_field(m.capacity_health),
        float_field(f64::from(m.charging_code())),
        float_field(m.voltage_volts),
        float_field(m.energy_wh),
        m.cycle_count,
        escape_string_field(&sample.status),
    );

    if let Some(nanos) = sample.timestamp.timestamp_nanos_opt() {
        let _ = write!(line, " {}", nanos);
    }

    line
}

fn float_field(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        "0".to_string()
    }
}

fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn escape_string_field(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
