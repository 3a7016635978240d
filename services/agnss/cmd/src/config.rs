//! Configuration handling for the agnss binary.
//!
//! Settings come from a YAML file and are then overridden by environment
//! variables. A missing or unparsable file falls back to defaults.

use agnss_session::{FlowConfig, FlowControl, DEFAULT_RX_BUFFER_BUDGET};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Binary configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgnssConfig {
    /// Flow control policy
    pub flow: FlowControl,
    /// Resends per message before it is failed
    pub retry_limit: u32,
    /// Acknowledgement timeout
    #[serde(with = "duration_str")]
    pub msg_timeout: Duration,
    /// Smart flow control byte budget
    pub rx_buffer_budget: usize,
    /// TCP address of the receiver bridge
    pub receiver_addr: String,
    /// How often deadlines are checked
    #[serde(with = "duration_str")]
    pub timeout_check_interval: Duration,
}

impl Default for AgnssConfig {
    fn default() -> Self {
        let flow = FlowConfig::default();
        Self {
            flow: flow.policy,
            retry_limit: flow.retry_limit,
            msg_timeout: flow.msg_timeout,
            rx_buffer_budget: DEFAULT_RX_BUFFER_BUDGET,
            receiver_addr: "127.0.0.1:2101".to_string(),
            timeout_check_interval: Duration::from_secs(1),
        }
    }
}

/// Durations written as humantime strings such as `"2s"` or `"500ms"`
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(d)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

impl AgnssConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<AgnssConfig>(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?} ({}), using defaults", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());

        info!(
            "Final configuration: flow={}, retry_limit={}, msg_timeout={}, receiver={}",
            config.flow,
            config.retry_limit,
            humantime::format_duration(config.msg_timeout),
            config.receiver_addr
        );
        Ok(config)
    }

    /// Apply `AGNSS_*` overrides looked up through `lookup`
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("AGNSS_FLOW") {
            match value.parse::<FlowControl>() {
                Ok(flow) => {
                    self.flow = flow;
                    info!("Flow control overridden by environment: {}", flow);
                }
                Err(e) => warn!("Ignoring AGNSS_FLOW: {}", e),
            }
        }

        if let Some(value) = lookup("AGNSS_RETRY_LIMIT") {
            if let Ok(limit) = value.parse::<u32>() {
                self.retry_limit = limit;
                info!("Retry limit overridden by environment: {}", limit);
            }
        }

        if let Some(value) = lookup("AGNSS_MSG_TIMEOUT") {
            if let Ok(timeout) = humantime::parse_duration(&value) {
                self.msg_timeout = timeout;
                info!("Message timeout overridden by environment: {}", value);
            }
        }

        if let Some(value) = lookup("AGNSS_RECEIVER_ADDR") {
            self.receiver_addr = value;
            info!("Receiver address overridden by environment: {}", self.receiver_addr);
        }
    }

    /// Engine settings
    pub fn flow_config(&self) -> FlowConfig {
        FlowConfig {
            policy: self.flow,
            retry_limit: self.retry_limit,
            msg_timeout: self.msg_timeout,
            rx_buffer_budget: self.rx_buffer_budget,
        }
    }
}
