//! The bridge loop
//!
//! Wires the stages together: read a chunk from MAME, parse it, update the
//! lamp register and push the resulting byte to the sink. Read failures lead
//! to a reconnect; the register and the active mapping survive it.

use crate::catalog::MappingCatalog;
use crate::config::BridgeConfig;
use crate::connection::{CancellationToken, ConnectionManager, Connector, ReadOutcome};
use crate::parser::{LineBuffer, MessageParser};
use crate::sink::{send_with_retry, OutputSink};
use crate::state::LampStateMachine;
use crate::types::{BridgeError, Result, Timestamp};
use chrono::Utc;

/// Counters collected while the bridge runs
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeStats {
    pub started_at: Timestamp,
    /// Time the current stream was established
    pub connected_at: Option<Timestamp>,
    pub chunks: u64,
    pub records: u64,
    pub bytes_sent: u64,
    pub reconnects: u64,
    pub sink_failures: u64,
}

impl BridgeStats {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            connected_at: None,
            chunks: 0,
            records: 0,
            bytes_sent: 0,
            reconnects: 0,
            sink_failures: 0,
        }
    }
}

/// Single-threaded pipeline from MAME's output server to a lamp sink
pub struct Bridge<'a, C: Connector, S: OutputSink> {
    connection: ConnectionManager<C>,
    machine: LampStateMachine<'a>,
    sink: S,
    lines: Option<LineBuffer>,
    buffer: Vec<u8>,
    sink_retries: u32,
    cancel: CancellationToken,
    stats: BridgeStats,
}

impl<'a, C: Connector, S: OutputSink> Bridge<'a, C, S> {
    pub fn new(
        config: &BridgeConfig,
        catalog: &'a MappingCatalog,
        connector: C,
        sink: S,
        cancel: CancellationToken,
    ) -> Self {
        let lines = config
            .buffer_partial_lines
            .then(|| LineBuffer::with_max_pending(config.max_pending_line));

        Self {
            connection: ConnectionManager::new(connector, config.connect_retry, cancel.clone()),
            machine: LampStateMachine::new(catalog),
            sink,
            lines,
            buffer: vec![0; config.read_buffer_size.max(1)],
            sink_retries: config.sink_retries,
            cancel,
            stats: BridgeStats::new(),
        }
    }

    /// Run until cancelled
    ///
    /// Cancellation is a normal exit and returns the collected stats. An
    /// error is only returned when a bounded connect policy gives up.
    pub fn run(&mut self) -> Result<BridgeStats> {
        if !self.establish()? {
            return Ok(self.finish());
        }

        while !self.cancel.is_cancelled() {
            match self.connection.read(&mut self.buffer) {
                Ok(ReadOutcome::Data(len)) => self.process_chunk(len),
                Ok(ReadOutcome::Idle) => {}
                Ok(ReadOutcome::Closed) => {
                    log::warn!("MAME has been closed, reconnecting");
                    if !self.reconnect()? {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("Lost connection to MAME ({}), reconnecting", e);
                    if !self.reconnect()? {
                        break;
                    }
                }
            }
        }

        Ok(self.finish())
    }

    /// Connect; `Ok(false)` means cancelled while waiting
    fn establish(&mut self) -> Result<bool> {
        match self.connection.connect() {
            Ok(()) => {
                self.stats.connected_at = Some(Utc::now());
                Ok(true)
            }
            Err(BridgeError::Cancelled) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn reconnect(&mut self) -> Result<bool> {
        self.connection.close();
        self.stats.reconnects += 1;
        // A partial line from the old stream can't be completed by the new one
        if let Some(lines) = self.lines.as_mut() {
            lines.clear();
        }
        self.establish()
    }

    fn process_chunk(&mut self, len: usize) {
        let chunk = &self.buffer[..len];
        let records = match self.lines.as_mut() {
            Some(lines) => lines.push(chunk),
            None => MessageParser::parse_chunk(chunk),
        };

        self.machine.apply_all(&records);
        self.stats.chunks += 1;
        self.stats.records += records.len() as u64;

        log::info!(
            "LAMPS: {} -> {:?}",
            self.machine.register(),
            String::from_utf8_lossy(chunk)
        );

        let byte = self.machine.current_byte();
        match send_with_retry(&mut self.sink, byte, self.sink_retries) {
            Ok(()) => self.stats.bytes_sent += 1,
            Err(e) => {
                self.stats.sink_failures += 1;
                log::error!("Dropping lamp frame {:08b}: {}", byte, e);
            }
        }
    }

    fn finish(&mut self) -> BridgeStats {
        self.connection.close();
        log::info!(
            "Bridge stopped: {} chunks, {} bytes sent, {} reconnects",
            self.stats.chunks,
            self.stats.bytes_sent,
            self.stats.reconnects
        );
        self.stats.clone()
    }

    pub fn machine(&self) -> &LampStateMachine<'a> {
        &self.machine
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
