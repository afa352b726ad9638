//! Bridge configuration types
//!
//! This module defines the settings the bridge loop needs: where MAME's
//! output server lives, how to retry when it is not there, and how hard to
//! try when the lamp controller rejects a write.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often and how long to wait between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Give up after this many attempts (None = retry until cancelled)
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Fixed delay between attempts in milliseconds (default: 1000ms)
    #[serde(default = "default_retry_delay")]
    pub delay_ms: u64,
}

fn default_retry_delay() -> u64 {
    1000
}

/// Whole milliseconds, saturating for durations too long for a u64
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl RetryPolicy {
    /// Retry forever with a fixed delay
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            delay_ms: millis(delay),
        }
    }

    /// Retry at most `max_attempts` times with a fixed delay
    pub fn bounded(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            delay_ms: millis(delay),
        }
    }

    /// Whether attempt number `attempt` (1-based) may run
    pub fn allows(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt <= max,
            None => true,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(Duration::from_millis(default_retry_delay()))
    }
}

/// Configuration for the bridge loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Host running MAME with `output network` enabled
    #[serde(default = "default_host")]
    pub host: String,

    /// MAME output server port (default: 8000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Size of each socket read (default: 4096 bytes)
    #[serde(default = "default_read_buffer")]
    pub read_buffer_size: usize,

    /// How often a blocked read wakes up to check for cancellation
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Retry policy for (re)connecting to MAME
    #[serde(default)]
    pub connect_retry: RetryPolicy,

    /// Extra attempts for a failed lamp byte before the frame is dropped
    #[serde(default = "default_sink_retries")]
    pub sink_retries: u32,

    /// Hold a line split across reads until its terminator arrives
    #[serde(default = "default_true")]
    pub buffer_partial_lines: bool,

    /// Largest unterminated line kept between reads
    #[serde(default = "default_max_pending")]
    pub max_pending_line: usize,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_read_buffer() -> usize {
    4096
}

fn default_poll_interval() -> u64 {
    250
}

fn default_sink_retries() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

fn default_max_pending() -> usize {
    crate::parser::DEFAULT_MAX_PENDING
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_buffer_size: default_read_buffer(),
            poll_interval_ms: default_poll_interval(),
            connect_retry: RetryPolicy::default(),
            sink_retries: default_sink_retries(),
            buffer_partial_lines: default_true(),
            max_pending_line: default_max_pending(),
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the MAME host and port
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Builder method: set the connect retry policy
    pub fn with_connect_retry(mut self, policy: RetryPolicy) -> Self {
        self.connect_retry = policy;
        self
    }

    /// Builder method: set extra attempts for failed lamp writes
    pub fn with_sink_retries(mut self, retries: u32) -> Self {
        self.sink_retries = retries;
        self
    }

    /// Builder method: set the cancellation poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = millis(interval);
        self
    }

    /// Builder method: enable or disable partial line buffering
    pub fn with_partial_line_buffering(mut self, enabled: bool) -> Self {
        self.buffer_partial_lines = enabled;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `host:port` string used for connecting and logging
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
