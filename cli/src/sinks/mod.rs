//! Where battery metrics go once the store is updated.
//!
//! The scrape endpoint reads the store on demand. Push sinks are driven by
//! the publish loop once per tick, after every battery has been sampled.

mod influx;
mod pushgateway;
pub mod scrape;

use std::time::Duration;

pub use influx::InfluxDb;
pub use pushgateway::Pushgateway;

use crate::exporter::publisher::TickReport;
use crate::exporter::store::MetricStore;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
}

/// A sink that transmits on every tick. Implementations block.
pub trait PushSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn push(&self, report: &TickReport, store: &MetricStore) -> Result<(), SinkError>;
}

fn http_agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(HTTP_TIMEOUT))
        .build()
        .into()
}
