use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use power_exporter_platform::POWER_SUPPLY_PATH;

pub const DEFAULT_CONFIG_PATH: &str = "power-exporter.toml";
pub const DEFAULT_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_PROMETHEUS_PORT: u16 = 9273;
pub const DEFAULT_PROMETHEUS_PATH: &str = "/metrics";
pub const DEFAULT_PUSHGATEWAY_JOB: &str = "power_exporter";

pub const DEFAULT_CONFIG: &str = r#"# Power Exporter Configuration

# Polling interval in seconds
interval = 10

# Hostname for metrics tagging (empty = system hostname)
host = "myhost"

# Where the kernel exposes power supplies
power_supply_path = "/sys/class/power_supply"

# Log level: off, error, warn, info, debug, trace
log_level = "info"

# Also write daily-rotated log files to this directory
# log_dir = "/var/log/power-exporter"

# Prometheus metrics server (scrape endpoint)
[prometheus]
enabled = true
port = 9273
path = "/metrics"

# Prometheus Pushgateway
[pushgateway]
enabled = false
url = "http://localhost:9091"
job = "power_exporter"

# InfluxDB v2 push
[influxdb]
enabled = false
url = "http://localhost:8086"
token = "your-token"
org = "your-org"
bucket = "your-bucket"
"#;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "off" => LogLevel::Off,
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }

    pub fn as_tracing_level(&self) -> Option<tracing::Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(tracing::Level::ERROR),
            LogLevel::Warn => Some(tracing::Level::WARN),
            LogLevel::Info => Some(tracing::Level::INFO),
            LogLevel::Debug => Some(tracing::Level::DEBUG),
            LogLevel::Trace => Some(tracing::Level::TRACE),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_PROMETHEUS_PORT,
            path: DEFAULT_PROMETHEUS_PATH.to_string(),
        }
    }
}

impl PrometheusConfig {
    pub fn effective_port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_PROMETHEUS_PORT
        } else {
            self.port
        }
    }

    /// Route the scrape handler is mounted on, always starting with `/`.
    pub fn effective_path(&self) -> String {
        let path = self.path.trim();
        if path.is_empty() {
            DEFAULT_PROMETHEUS_PATH.to_string()
        } else if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PushgatewayConfig {
    pub enabled: bool,
    pub url: String,
    pub job: String,
}

impl PushgatewayConfig {
    pub fn effective_job(&self) -> &str {
        if self.job.is_empty() {
            DEFAULT_PUSHGATEWAY_JOB
        } else {
            &self.job
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub enabled: bool,
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub interval: u64,
    pub host: String,
    pub power_supply_path: PathBuf,
    pub log_level: LogLevel,
    pub log_dir: Option<PathBuf>,
    pub prometheus: PrometheusConfig,
    pub pushgateway: PushgatewayConfig,
    pub influxdb: InfluxConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL_SECS,
            host: String::new(),
            power_supply_path: PathBuf::from(POWER_SUPPLY_PATH),
            log_level: LogLevel::Info,
            log_dir: None,
            prometheus: PrometheusConfig::default(),
            pushgateway: PushgatewayConfig::default(),
            influxdb: InfluxConfig::default(),
        }
    }
}

impl Config {
    /// Loads and validates the config file. Any failure here is fatal to the
    /// exporter, so unlike a UI config nothing falls back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prometheus.enabled {
            let path = self.prometheus.effective_path();
            if let Some(segment) = path.split('/').find(|segment| !is_literal_segment(segment)) {
                return Err(ConfigError::Invalid(format!(
                    "prometheus.path segment `{}` must be literal (no leading `:` or `*`, no braces)",
                    segment
                )));
            }
        }

        if self.pushgateway.enabled && self.pushgateway.url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "pushgateway.url is required when pushgateway is enabled".to_string(),
            ));
        }

        if self.influxdb.enabled {
            for (name, value) in [
                ("url", &self.influxdb.url),
                ("org", &self.influxdb.org),
                ("bucket", &self.influxdb.bucket),
            ] {
                if value.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "influxdb.{} is required when influxdb is enabled",
                        name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Sampling interval; zero means the default.
    pub fn interval(&self) -> Duration {
        if self.interval == 0 {
            Duration::from_secs(DEFAULT_INTERVAL_SECS)
        } else {
            Duration::from_secs(self.interval)
        }
    }

    /// Host label for push grouping and InfluxDB tags.
    pub fn host_label(&self) -> String {
        if !self.host.trim().is_empty() {
            return self.host.trim().to_string();
        }
        system_hostname().unwrap_or_default()
    }
}

/// The scrape route is mounted as-is, so it must not contain route captures.
fn is_literal_segment(segment: &str) -> bool {
    !segment.starts_with(':') && !segment.starts_with('*') && !segment.contains(['{', '}'])
}

fn system_hostname() -> Option<String> {
    fs::read_to_string("/proc/sys/kernel/hostname")
        .or_else(|_| fs::read_to_string("/etc/hostname"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn write_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, DEFAULT_CONFIG)
}
