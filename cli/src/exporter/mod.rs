pub mod publisher;
pub mod store;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use power_exporter_platform::BatterySource;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::sinks::{scrape, InfluxDb, Pushgateway};
use publisher::Publisher;
use store::MetricStore;

#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    #[error("no batteries found in {}", path.display())]
    NoBatteries { path: PathBuf },

    #[error("failed to create metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("failed to bind metrics listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics server error: {0}")]
    Serve(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExporterError>;

/// Everything the exporter runs with, built before anything is started.
pub struct Exporter {
    config: Config,
    store: Arc<MetricStore>,
    publisher: Publisher,
}

impl Exporter {
    /// Enumerates batteries once and builds the store and sinks. Fails if
    /// there is nothing to export.
    pub fn new(config: Config, source: Arc<dyn BatterySource>) -> Result<Self> {
        let devices = source.devices();
        if devices.is_empty() {
            return Err(ExporterError::NoBatteries {
                path: config.power_supply_path.clone(),
            });
        }
        info!(
            batteries = ?devices.iter().map(|d| d.as_str()).collect::<Vec<_>>(),
            "Found batteries"
        );

        let store = Arc::new(MetricStore::new(&devices)?);
        let host = config.host_label();

        let mut publisher = Publisher::new(source, Arc::clone(&store));
        if config.pushgateway.enabled {
            let sink = Pushgateway::new(&config.pushgateway, &host);
            info!(url = %sink.url(), "Pushgateway enabled");
            publisher = publisher.with_sink(Box::new(sink));
        }
        if config.influxdb.enabled {
            info!(url = %config.influxdb.url, bucket = %config.influxdb.bucket, "InfluxDB enabled");
            publisher = publisher.with_sink(Box::new(InfluxDb::new(&config.influxdb, &host)));
        }

        Ok(Self {
            config,
            store,
            publisher,
        })
    }

    /// Runs the publish loop, and the scrape endpoint when enabled, until
    /// `shutdown` flips to true.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let scrape = if self.config.prometheus.enabled {
            let port = self.config.prometheus.effective_port();
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            let listener = scrape::bind(addr)
                .await
                .map_err(|source| ExporterError::Bind { addr, source })?;
            Some((listener, self.config.prometheus.effective_path()))
        } else {
            None
        };

        let publisher = Arc::new(self.publisher);
        let publish_loop = tokio::spawn(publisher.run(self.config.interval(), shutdown.clone()));

        let served = match scrape {
            Some((listener, path)) => {
                let router = scrape::router(Arc::clone(&self.store), &path);
                scrape::serve(listener, router, shutdown).await
            }
            None => Ok(()),
        };

        finish(publish_loop, served).await
    }
}

/// Waits for the publish loop after the scrape server has returned. A server
/// error stops the loop instead of leaving it running on its own.
async fn finish(publish_loop: JoinHandle<()>, served: std::io::Result<()>) -> Result<()> {
    if let Err(e) = served {
        publish_loop.abort();
        let _ = publish_loop.await;
        return Err(ExporterError::Serve(e));
    }

    if let Err(e) = publish_loop.await {
        error!(error = %e, "Publish loop task failed");
    }
    Ok(())
}
