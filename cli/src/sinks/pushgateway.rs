use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::debug;

use crate::config::PushgatewayConfig;
use crate::exporter::publisher::TickReport;
use crate::exporter::store::MetricStore;
use crate::sinks::{http_agent, PushSink, SinkError};

const HOST_LABEL: &str = "host";

/// Replaces the grouping `{job, host}` on a Prometheus Pushgateway with the
/// full store on every tick.
pub struct Pushgateway {
    agent: ureq::Agent,
    url: String,
}

impl Pushgateway {
    pub fn new(config: &PushgatewayConfig, host: &str) -> Self {
        Self {
            agent: http_agent(),
            url: grouping_url(&config.url, config.effective_job(), host),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PushSink for Pushgateway {
    fn name(&self) -> &'static str {
        "pushgateway"
    }

    fn push(&self, _report: &TickReport, store: &MetricStore) -> Result<(), SinkError> {
        let body = store.encode_text()?;
        self.agent
            .put(&self.url)
            .header("Content-Type", prometheus::TEXT_FORMAT)
            .send(body.as_bytes())?;
        debug!(url = %self.url, bytes = body.len(), "Pushed to pushgateway");
        Ok(())
    }
}

fn grouping_url(base: &str, job: &str, host: &str) -> String {
    format!(
        "{}/metrics/{}/{}",
        base.trim_end_matches('/'),
        path_segment("job", job),
        path_segment(HOST_LABEL, host)
    )
}

/// Encodes one `label/value` pair of a grouping key path. Values that are
/// empty or not plain URL-safe text use the `@base64` form.
fn path_segment(label: &str, value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'));

    if plain {
        format!("{}/{}", label, value)
    } else if value.is_empty() {
        format!("{}@base64/=", label)
    } else {
        format!("{}@base64/{}", label, URL_SAFE_NO_PAD.encode(value))
    }
}

#[cfg(test)]
mod tests {
    use power_exporter_platform::DeviceId;

    use super::*;
    use crate::exporter::store::MetricName;
    use crate::sinks::testing::accept_one;

    #[test]
    fn test_grouping_url() {
        let config = PushgatewayConfig {
            enabled: true,
            url: "http://localhost:9091/".to_string(),
            job: String::new(),
        };
        let sink = Pushgateway::new(&config, "laptop-7");
        assert_eq!(
            sink.url(),
            "http://localhost:9091/metrics/job/power_exporter/host/laptop-7"
        );
    }

    #[test]
    fn test_path_segment_encoding() {
        assert_eq!(path_segment("host", "box.lan"), "host/box.lan");
        assert_eq!(path_segment("host", ""), "host@base64/=");
        assert_eq!(path_segment("host", "a/b"), "host@base64/YS9i");
        assert_eq!(path_segment("job", "my job"), "job@base64/bXkgam9i");
    }

    #[test]
    fn test_push_puts_store_under_grouping_key() {
        let (base_url, server) = accept_one(200);
        let config = PushgatewayConfig {
            enabled: true,
            url: base_url,
            job: String::new(),
        };
        let sink = Pushgateway::new(&config, "box");
        let bat0 = DeviceId::from("BAT0");
        let store = MetricStore::new(&[bat0.clone()]).unwrap();
        store.set(MetricName::Percentage, &bat0, 64.0);

        sink.push(&TickReport::default(), &store).unwrap();
        let request = server.join().unwrap();

        assert_eq!(request.method, "PUT");
        assert_eq!(request.target, "/metrics/job/power_exporter/host/box");
        assert_eq!(request.header("content-type"), Some(prometheus::TEXT_FORMAT));
        assert!(request
            .body
            .contains("battery_percentage{battery=\"BAT0\"} 64"));
        assert!(request.body.contains("# TYPE battery_cycle_count gauge"));
    }

    #[test]
    fn test_push_to_unreachable_gateway_is_error() {
        let config = PushgatewayConfig {
            enabled: true,
            url: "http://127.0.0.1:1".to_string(),
            job: "power_exporter".to_string(),
        };
        let sink = Pushgateway::new(&config, "box");
        let store = MetricStore::new(&[]).unwrap();

        let err = sink.push(&TickReport::default(), &store).unwrap_err();
        assert!(matches!(err, SinkError::Http(_)));
    }
}
