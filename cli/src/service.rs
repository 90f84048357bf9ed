//! Installing the exporter as a systemd service.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::write_default_config;

pub const SERVICE_NAME: &str = "power-exporter";
pub const DEFAULT_BIN_PATH: &str = "/usr/local/bin/power-exporter";
pub const DEFAULT_INSTALL_CONFIG_PATH: &str = "/usr/local/etc/power-exporter.toml";
pub const DEFAULT_UNIT_PATH: &str = "/etc/systemd/system/power-exporter.service";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to {action}: {source}")]
    Io {
        action: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {status}")]
    Command { command: String, status: String },
}

pub type Result<T> = std::result::Result<T, ServiceError>;

fn io_err(action: impl Into<String>) -> impl FnOnce(io::Error) -> ServiceError {
    let action = action.into();
    move |source| ServiceError::Io { action, source }
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub bin_path: PathBuf,
    pub config_path: PathBuf,
    pub unit_path: PathBuf,
    /// Run `systemctl daemon-reload`, `enable` and `start` after writing files.
    pub start: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            bin_path: PathBuf::from(DEFAULT_BIN_PATH),
            config_path: PathBuf::from(DEFAULT_INSTALL_CONFIG_PATH),
            unit_path: PathBuf::from(DEFAULT_UNIT_PATH),
            start: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub config_created: bool,
    pub service_started: bool,
}

impl InstallReport {
    /// What the install left behind, for the user.
    pub fn summary(&self, options: &InstallOptions) -> String {
        let config = if self.config_created {
            format!("Config created at {}", options.config_path.display())
        } else {
            format!("Using existing config at {}", options.config_path.display())
        };
        let service = if self.service_started {
            "Service enabled and started".to_string()
        } else {
            format!("Service not started; run `systemctl enable --now {}`", SERVICE_NAME)
        };
        format!("{}\n{}", config, service)
    }
}

pub fn generate_unit(bin_path: &Path, config_path: &Path) -> String {
    format!(
        r#"[Unit]
Description=Power Exporter - Exports battery metrics to Prometheus
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
ExecStart={exe} -c {config}
Restart=always
RestartSec=5

[Install]
WantedBy=multi-user.target
"#,
        exe = bin_path.display(),
        config = config_path.display(),
    )
}

fn warn_if_dev_binary(exe_path: &Path) {
    let exe_str = exe_path.to_string_lossy();
    if exe_str.contains("/target/debug/") {
        eprintln!(
            "Warning: Installing a debug build from {}\n\
             Consider building with --release first",
            exe_path.display()
        );
    }
}

pub fn install_service(options: &InstallOptions) -> Result<InstallReport> {
    let exe = std::env::current_exe().map_err(io_err("locate current executable"))?;
    warn_if_dev_binary(&exe);

    let mut report = install_files(&exe, options)?;

    if options.start {
        for args in [
            &["daemon-reload"][..],
            &["enable", SERVICE_NAME][..],
            &["start", SERVICE_NAME][..],
        ] {
            systemctl(args)?;
        }
        report.service_started = true;
    }

    Ok(report)
}

/// Copies the binary, writes the config if it does not exist yet, and writes
/// the unit file.
fn install_files(exe: &Path, options: &InstallOptions) -> Result<InstallReport> {
    let mut report = InstallReport::default();

    let binary = fs::read(exe).map_err(io_err(format!("read {}", exe.display())))?;
    if let Some(parent) = options.bin_path.parent() {
        fs::create_dir_all(parent).map_err(io_err(format!("create {}", parent.display())))?;
    }
    fs::write(&options.bin_path, binary)
        .map_err(io_err(format!("write binary to {}", options.bin_path.display())))?;
    set_executable(&options.bin_path)?;
    println!("Binary installed to {}", options.bin_path.display());

    if !options.config_path.exists() {
        write_default_config(&options.config_path)
            .map_err(io_err(format!("write config to {}", options.config_path.display())))?;
        report.config_created = true;
    }

    let unit = generate_unit(&options.bin_path, &options.config_path);
    if let Some(parent) = options.unit_path.parent() {
        fs::create_dir_all(parent).map_err(io_err(format!("create {}", parent.display())))?;
    }
    fs::write(&options.unit_path, unit)
        .map_err(io_err(format!("write systemd unit to {}", options.unit_path.display())))?;
    println!("Systemd unit created at {}", options.unit_path.display());

    Ok(report)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(io_err(format!("set permissions on {}", path.display())))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

fn systemctl(args: &[&str]) -> Result<()> {
    let command = format!("systemctl {}", args.join(" "));
    let status = Command::new("systemctl")
        .args(args)
        .status()
        .map_err(io_err(format!("run {}", command)))?;

    if status.success() {
        Ok(())
    } else {
        Err(ServiceError::Command {
            command,
            status: status.to_string(),
        })
    }
}
