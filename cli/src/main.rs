mod config;
mod exporter;
mod logging;
mod service;
mod sinks;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use config::{Config, LogLevel, DEFAULT_CONFIG_PATH};
use exporter::Exporter;
use logging::LogMode;
use power_exporter_platform::{
    BatteryMetrics, BatterySource, DeviceId, RawReading, SysfsPowerSupply,
};
use service::{
    InstallOptions, DEFAULT_BIN_PATH, DEFAULT_INSTALL_CONFIG_PATH, DEFAULT_UNIT_PATH,
};

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the exporter (default)
    Run,

    /// Write the default config file
    #[command(alias = "gc")]
    GenConfig {
        /// Where to write the config
        path: PathBuf,
    },

    /// Install as a systemd service
    Install {
        /// Where to install the binary
        #[arg(long, default_value = DEFAULT_BIN_PATH)]
        bin: PathBuf,

        /// Where to write the unit file
        #[arg(long, default_value = DEFAULT_UNIT_PATH)]
        unit: PathBuf,

        /// Only write files; skip systemctl
        #[arg(long)]
        no_start: bool,
    },

    /// Print detected batteries and their current metrics
    #[command(alias = "ls")]
    Devices {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

/// Exports Linux battery metrics to Prometheus, Pushgateway and InfluxDB
#[derive(Debug, Parser)]
#[command(name = "power-exporter", version, verbatim_doc_comment)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file [default: power-exporter.toml, or
    /// /usr/local/etc/power-exporter.toml for install]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

impl Cli {
    /// Config path for the command: the one given on the command line, else
    /// the command's default. `install` defaults to the system-wide path the
    /// unit file points at.
    fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.config {
            return path.clone();
        }
        match self.command {
            Some(Commands::Install { .. }) => PathBuf::from(DEFAULT_INSTALL_CONFIG_PATH),
            _ => PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config_path = cli.config_path();
    let log_level_override = cli.log_level.as_deref().map(LogLevel::from_str);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_exporter(&config_path, log_level_override),
        Commands::GenConfig { path } => {
            config::write_default_config(&path)
                .wrap_err_with(|| format!("Failed to write config to {}", path.display()))?;
            println!("Config written to {}", path.display());
            Ok(())
        }
        Commands::Install { bin, unit, no_start } => {
            let _guard = logging::init(LogLevel::Info, LogMode::Stderr, log_level_override);
            let options = InstallOptions {
                bin_path: bin,
                config_path,
                unit_path: unit,
                start: !no_start,
            };
            let report = service::install_service(&options).wrap_err("Installation failed")?;
            println!("{}", report.summary(&options));
            Ok(())
        }
        Commands::Devices { json } => run_devices(&config_path, log_level_override, json),
    }
}

fn run_exporter(config_path: &Path, log_level_override: Option<LogLevel>) -> Result<()> {
    let config = Config::load(config_path).wrap_err("Failed to load config")?;
    let _guard = logging::init(
        config.log_level,
        LogMode::from_dir(config.log_dir.as_deref()),
        log_level_override,
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting power-exporter"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let source = Arc::new(SysfsPowerSupply::new(&config.power_supply_path));
        let exporter = Exporter::new(config, source)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        });

        exporter.run(shutdown_rx).await
    })?;

    info!("power-exporter stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[derive(Debug, Serialize)]
struct DeviceReport {
    device: DeviceId,
    reading: RawReading,
    metrics: BatteryMetrics,
}

fn run_devices(config_path: &Path, log_level_override: Option<LogLevel>, json: bool) -> Result<()> {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: {}; using defaults", e);
            Config::default()
        }
    };
    let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);

    let supply = SysfsPowerSupply::new(&config.power_supply_path);
    if !supply.is_supported() {
        if json {
            println!("[]");
        } else {
            println!("No power_supply directory at {}", supply.root().display());
        }
        return Ok(());
    }

    let mut reports = Vec::new();
    for device in supply.devices() {
        match supply.read(&device) {
            Ok(reading) => {
                let metrics = BatteryMetrics::derive(&reading);
                reports.push(DeviceReport {
                    device,
                    reading,
                    metrics,
                });
            }
            Err(e) => warn!(device = %device, error = %e, "Failed to read battery"),
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    if reports.is_empty() {
        println!("No batteries found in {}", supply.root().display());
        return Ok(());
    }

    for report in &reports {
        print_device(report);
    }
    Ok(())
}

fn print_device(report: &DeviceReport) {
    let DeviceReport {
        device,
        reading,
        metrics,
    } = report;

    println!("{}", device);
    println!(
        "  Status:     {} (code {}, {})",
        metrics.state,
        metrics.charging_code(),
        if metrics.state.is_plugged_in() {
            "on AC"
        } else {
            "on battery"
        }
    );
    println!("  Charge:     {:.1}%", metrics.percentage);
    println!("  Health:     {:.1}%", metrics.capacity_health);
    println!("  Voltage:    {:.2} V", metrics.voltage_volts);
    println!("  Energy:     {:.2} Wh", metrics.energy_wh);
    println!("  Cycles:     {}", metrics.cycle_count);
    println!("  Present:    {}", if reading.present { "yes" } else { "no" });
    if !reading.technology.is_empty() {
        println!("  Technology: {}", reading.technology);
    }
    for (label, value) in [
        ("Vendor", &reading.manufacturer),
        ("Model", &reading.model),
        ("Serial", &reading.serial),
    ] {
        if let Some(value) = value {
            println!("  {:<11} {}", format!("{}:", label), value.trim());
        }
    }
}
