use std::env;
use std::time::Duration;

pub struct PanelConfig {
    pub http_bind: String,
    pub device_url: String,
    pub events_url: String,
    pub event_log_capacity: usize,
    pub request_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl PanelConfig {
    pub fn from_env() -> Self {
        let device_url = env_var("DEVICE_URL", "http://192.168.4.1");
        let events_url =
            env::var("DEVICE_EVENTS_URL").unwrap_or_else(|_| default_events_url(&device_url));
        Self {
            http_bind: env_var("PANEL_BIND", "0.0.0.0:8080"),
            device_url,
            events_url,
            event_log_capacity: env_var("EVENT_LOG_CAPACITY", "500").parse().unwrap_or(500),
            request_timeout: Duration::from_secs(
                env_var("REQUEST_TIMEOUT_SECS", "10").parse().unwrap_or(10),
            ),
            reconnect_delay: Duration::from_secs(
                env_var("EVENTS_RECONNECT_SECS", "5").parse().unwrap_or(5),
            ),
        }
    }
}

fn env_var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// The firmware serves its event socket on port 81 of the same host.
fn default_events_url(device_url: &str) -> String {
    let host = reqwest::Url::parse(device_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "192.168.4.1".to_string());
    format!("ws://{host}:81")
}
