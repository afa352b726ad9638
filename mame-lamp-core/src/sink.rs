//! Output sinks for the lamp byte
//!
//! The lamp controller only ever receives one byte at a time. Anything that
//! can accept a byte and report failure can stand in for it.

use crate::types::{BridgeError, Result};
use std::io::Write;

/// Single-byte consumer (usually the serial link to the lamp controller)
pub trait OutputSink {
    /// Deliver one lamp byte; failures must be reported, not dropped
    fn send(&mut self, byte: u8) -> Result<()>;
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn send(&mut self, byte: u8) -> Result<()> {
        (**self).send(byte)
    }
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn send(&mut self, byte: u8) -> Result<()> {
        (**self).send(byte)
    }
}

/// In-memory sink, handy for tests and dry runs
impl OutputSink for Vec<u8> {
    fn send(&mut self, byte: u8) -> Result<()> {
        self.push(byte);
        Ok(())
    }
}

/// Adapts any [`Write`] (serial port, file, socket) to an [`OutputSink`]
///
/// Every byte is flushed immediately so the lamps follow the game.
pub struct WriteSink<W: Write> {
    writer: W,
}

impl<W: Write> WriteSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputSink for WriteSink<W> {
    fn send(&mut self, byte: u8) -> Result<()> {
        self.writer
            .write_all(&[byte])
            .and_then(|_| self.writer.flush())
            .map_err(|e| BridgeError::Sink(e.to_string()))
    }
}

/// Send a byte, retrying up to `retries` extra times on failure
///
/// Returns the last error once every attempt failed.
pub fn send_with_retry<S: OutputSink + ?Sized>(sink: &mut S, byte: u8, retries: u32) -> Result<()> {
    let mut attempt = 0;
    loop {
        match sink.send(byte) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < retries => {
                attempt += 1;
                log::warn!("Lamp write failed ({}), retry {}/{}", e, attempt, retries);
            }
            Err(e) => return Err(e),
        }
    }
}
