//! MAME Lamp Bridge Library
//!
//! Turns MAME's network output (`-output network`) into a single lamp byte
//! for an external controller, typically an arduino on a serial port.
//!
//! # Architecture
//!
//! The pipeline has three stages that run on one thread:
//! - [`ConnectionManager`] keeps a TCP stream to MAME alive and reconnects
//! - [`MessageParser`] turns raw chunks into `key = value` records
//! - [`LampStateMachine`] maps record keys to lamp bits using a
//!   [`MappingCatalog`], switching tables when MAME announces a title
//!
//! The resulting byte goes to an [`OutputSink`] after every chunk.
//!
//! The library does NOT:
//! - Discover or open serial ports
//! - Install signal handlers
//!
//! Both live in the application layer (mame-lamp-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use mame_lamp_core::{
//!     Bridge, BridgeConfig, CancellationToken, MappingCatalog, TcpConnector,
//! };
//! use std::path::Path;
//!
//! let catalog = MappingCatalog::load(Path::new("output_map.json")).unwrap();
//! let config = BridgeConfig::new().with_address("localhost", 8000);
//! let connector = TcpConnector::new(config.address(), config.poll_interval());
//!
//! let mut bridge = Bridge::new(
//!     &config,
//!     &catalog,
//!     connector,
//!     Vec::new(),
//!     CancellationToken::new(),
//! );
//! let stats = bridge.run().unwrap();
//! println!("Sent {} lamp bytes", stats.bytes_sent);
//! ```

// Public modules
pub mod bridge;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod parser;
pub mod sink;
pub mod state;
pub mod types;

// Re-export main types for convenience
pub use bridge::{Bridge, BridgeStats};
pub use catalog::{MappingCatalog, MappingTable, DEFAULTS_KEY, DEFAULT_CATALOG_FILE};
pub use config::{BridgeConfig, RetryPolicy};
pub use connection::{
    CancellationToken, ConnectionManager, Connector, ReadOutcome, TcpConnector, HANDSHAKE,
};
pub use parser::{LineBuffer, MessageParser};
pub use sink::{send_with_retry, OutputSink, WriteSink};
pub use state::{ActiveMapping, Applied, LampStateMachine, CONTROL_KEY};
pub use types::{BitIndex, BridgeError, LampRegister, Record, Result, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
