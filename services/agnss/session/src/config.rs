//! Flow control configuration.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default receiver input buffer assumed by smart flow control
pub const DEFAULT_RX_BUFFER_BUDGET: usize = 1000;

/// How messages are paced towards the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    /// Write everything at once, ignore acknowledgements
    None,
    /// One message in flight at a time
    #[default]
    Simple,
    /// Several messages in flight, bounded by the receiver buffer budget
    Smart,
}

/// Unrecognised flow control name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown flow control policy: {0}")]
pub struct ParseFlowControlError(String);

impl FromStr for FlowControl {
    type Err = ParseFlowControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(FlowControl::None),
            "simple" => Ok(FlowControl::Simple),
            "smart" => Ok(FlowControl::Smart),
            _ => Err(ParseFlowControlError(s.to_string())),
        }
    }
}

impl std::fmt::Display for FlowControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlowControl::None => "none",
            FlowControl::Simple => "simple",
            FlowControl::Smart => "smart",
        };
        f.write_str(name)
    }
}

/// Per-session transfer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    /// Pacing policy
    pub policy: FlowControl,
    /// Resends allowed per message before it is failed
    pub retry_limit: u32,
    /// Time to wait for an acknowledgement
    pub msg_timeout: Duration,
    /// Outstanding bytes allowed under smart flow control
    pub rx_buffer_budget: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            policy: FlowControl::Simple,
            retry_limit: 3,
            msg_timeout: Duration::from_secs(2),
            rx_buffer_budget: DEFAULT_RX_BUFFER_BUDGET,
        }
    }
}
