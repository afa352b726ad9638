//! Core types for the lamp bridge library
//!
//! This module defines the values that flow through the pipeline: parsed
//! records, the 8-bit lamp register and the error type shared by every stage.

use chrono::{DateTime, Utc};
use std::fmt;

/// Timestamp type used throughout the bridge
pub type Timestamp = DateTime<Utc>;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while running the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Mapping catalog has no \"defaults\" table")]
    MissingDefaults,

    #[error("Bit index {bit} for signal '{signal}' in table '{title}' is out of range (0-7)")]
    BitOutOfRange {
        title: String,
        signal: String,
        bit: u64,
    },

    #[error("Failed to parse mapping catalog: {0}")]
    CatalogParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Gave up connecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Output sink failed: {0}")]
    Sink(String),
}

/// One `key = value` unit extracted from a line of the output stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Signal name (or the title-announcement control key)
    pub key: String,
    /// Raw value text, usually "0" or "1"
    pub value: String,
}

impl Record {
    /// Create a new record
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.key, self.value)
    }
}

/// A lamp position inside the register, always in 0..=7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitIndex(u8);

impl BitIndex {
    /// Highest valid bit position
    pub const MAX: u8 = 7;

    /// Create a bit index, or `None` if it does not fit in a byte
    pub fn new(bit: u8) -> Option<Self> {
        (bit <= Self::MAX).then_some(Self(bit))
    }

    /// Raw bit position
    pub fn get(self) -> u8 {
        self.0
    }

    fn mask(self) -> u8 {
        1 << self.0
    }
}

impl fmt::Display for BitIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The 8-bit lamp state sent to the controller
///
/// Bit 0 is the least significant lamp. `Display` renders the register as
/// eight binary digits, most significant bit first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LampRegister(u8);

impl LampRegister {
    /// Create a register with every lamp off
    pub fn new() -> Self {
        Self(0)
    }

    /// Turn a lamp on
    pub fn set_bit(&mut self, bit: BitIndex) {
        self.0 |= bit.mask();
    }

    /// Turn a lamp off
    pub fn clear_bit(&mut self, bit: BitIndex) {
        self.0 &= !bit.mask();
    }

    /// Check whether a lamp is on
    pub fn is_set(&self, bit: BitIndex) -> bool {
        self.0 & bit.mask() != 0
    }

    /// Register value as a single byte
    pub fn as_byte(&self) -> u8 {
        self.0
    }
}

impl From<u8> for LampRegister {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for LampRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08b}", self.0)
    }
}
