//! Host configuration

use clap::ValueEnum;
use rcmd_shared::protocol::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT, MAX_MESSAGE_SIZE};
use rcmd_shared::{JsonProcessor, PlainTextProcessor, Processor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Wire format used by engines and connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum WireFormat {
    /// `#key=value` header lines plus wrapped payload
    #[default]
    Plain,
    /// JSON object with `header` and `payload`
    Json,
}

impl WireFormat {
    /// Build the processor for this format
    pub fn processor(self, pretty: bool) -> Arc<dyn Processor> {
        match self {
            WireFormat::Plain => Arc::new(PlainTextProcessor::new()),
            WireFormat::Json => Arc::new(JsonProcessor::new(pretty)),
        }
    }
}

/// Configuration for a command host
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Address the TCP engine binds to
    pub bind: String,
    /// Port the TCP engine listens on
    pub port: u16,
    /// Wire format
    pub format: WireFormat,
    /// Pretty-print JSON output
    pub pretty: bool,
    /// Directory to watch instead of listening on TCP
    pub watch_dir: Option<PathBuf>,
    /// Directory receiving responses of the directory engine
    pub response_dir: Option<PathBuf>,
    /// Connection timeout for outgoing requests
    pub connect_timeout: Duration,
    /// Read timeout for a single message
    pub read_timeout: Duration,
    /// Largest accepted message in bytes
    pub max_message_size: usize,
    /// Interval of polling loops
    pub poll_interval: Duration,
    /// Per-flow stop timeout at shutdown
    pub flow_timeout: Duration,
    /// Time granted to the engine to stop at shutdown
    pub grace_period: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            format: WireFormat::Plain,
            pretty: false,
            watch_dir: None,
            response_dir: None,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            max_message_size: MAX_MESSAGE_SIZE,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            flow_timeout: Duration::from_secs(5),
            grace_period: Duration::from_secs(10),
        }
    }
}

impl HostConfig {
    /// Processor for the configured wire format
    pub fn processor(&self) -> Arc<dyn Processor> {
        self.format.processor(self.pretty)
    }

    /// Address clients of this host connect to (wildcard binds map to loopback)
    pub fn connect_host(&self) -> String {
        match self.bind.as_str() {
            "0.0.0.0" | "::" | "" => "127.0.0.1".into(),
            other => other.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.port, 12345);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.processor().name(), "plain");
    }

    #[test]
    fn test_connect_host_maps_wildcards() {
        let mut config = HostConfig {
            bind: "0.0.0.0".into(),
            ..Default::default()
        };
        assert_eq!(config.connect_host(), "127.0.0.1");

        config.bind = "10.1.2.3".into();
        assert_eq!(config.connect_host(), "10.1.2.3");
    }

    #[test]
    fn test_json_format_processor() {
        assert_eq!(WireFormat::Json.processor(true).name(), "json");
    }
}
