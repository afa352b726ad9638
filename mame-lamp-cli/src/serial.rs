//! Serial link to the lamp controller
//!
//! Finds and opens the port the arduino sits on and wraps it as an
//! [`OutputSink`](mame_lamp_core::OutputSink).

use anyhow::{bail, Context, Result};
use mame_lamp_core::WriteSink;
use serialport::SerialPort;
use std::time::Duration;

use crate::config::SerialConfig;

/// Baud rate the lamp controller firmware listens on
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Write timeout so a stuck controller can't stall the bridge loop
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

pub type SerialSink = WriteSink<Box<dyn SerialPort>>;

/// Names of all serial ports the OS reports
pub fn list_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().context("Failed to list serial ports")?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// First port that can actually be opened, if any
///
/// Ports held by another process show up in the listing but fail to open,
/// so each candidate is opened and closed again.
pub fn find_first_port() -> Result<Option<String>> {
    for name in list_ports()? {
        match serialport::new(&name, DEFAULT_BAUD_RATE).open() {
            Ok(_) => return Ok(Some(name)),
            Err(e) => log::debug!("Skipping serial port {}: {}", name, e),
        }
    }
    Ok(None)
}

/// Open a named port as a lamp sink
pub fn open_port(port_name: &str, baud_rate: u32) -> Result<SerialSink> {
    let port = serialport::new(port_name, baud_rate)
        .timeout(WRITE_TIMEOUT)
        .open()
        .with_context(|| format!("Could not open serial port {} @ {} baud", port_name, baud_rate))?;

    log::info!("Serial port opened: {} @ {} baud", port_name, baud_rate);
    Ok(WriteSink::new(port))
}

/// Pick a port per configuration and open it
pub fn open_configured(config: &SerialConfig) -> Result<SerialSink> {
    let detected = if config.autodetect {
        find_first_port()?
    } else {
        None
    };

    let port_name = match (detected, &config.port) {
        (Some(name), _) => {
            log::info!("Serial port detected: {}", name);
            name
        }
        (None, Some(name)) => name.clone(),
        (None, None) => bail!("No serial port found; pass --serial <PORT> or use --dry-run"),
    };

    open_port(&port_name, config.baud_rate)
}
