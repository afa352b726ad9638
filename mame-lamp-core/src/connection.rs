//! Connection to MAME's network output server
//!
//! MAME (with `-output network`) serves a plain TCP stream once it receives
//! an HTTP-style request. [`ConnectionManager`] keeps that stream alive:
//! it retries the connection according to a [`RetryPolicy`], sends the
//! request once per stream and hands out raw chunks.

use crate::config::RetryPolicy;
use crate::types::{BridgeError, Result};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Request that starts the output stream
pub const HANDSHAKE: &[u8] = b"GET / HTTP/1.1\r\n\r\n";

/// Longest single sleep while waiting between retries
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Shared flag used to stop the bridge from another thread or a signal handler
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sleep for `duration`, waking early on cancellation
    ///
    /// Returns `false` if the token was cancelled before the time elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.is_cancelled() {
                return false;
            }
            let step = remaining.min(CANCEL_CHECK_INTERVAL);
            std::thread::sleep(step);
            remaining -= step;
        }
        !self.is_cancelled()
    }
}

/// Opens a fresh byte stream to the output source
pub trait Connector {
    type Stream: Read + Write;

    fn open(&mut self) -> io::Result<Self::Stream>;

    /// Human readable target for log messages
    fn describe(&self) -> String;
}

/// TCP connector for a MAME instance
///
/// Reads time out after `poll_interval` so a blocked read can notice
/// cancellation; a timeout is not treated as a connection failure.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
    poll_interval: Duration,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            address: address.into(),
            poll_interval,
        }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn open(&mut self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(&self.address)?;
        stream.set_nodelay(true)?;
        // A zero duration is rejected by set_read_timeout, so fall back to blocking reads
        let timeout = (!self.poll_interval.is_zero()).then_some(self.poll_interval);
        stream.set_read_timeout(timeout)?;
        Ok(stream)
    }

    fn describe(&self) -> String {
        self.address.clone()
    }
}

/// Result of a single read on the current stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were written to the caller's buffer
    Data(usize),
    /// No data before the poll interval elapsed
    Idle,
    /// The source closed the stream
    Closed,
}

/// Owns the stream to MAME and re-establishes it on demand
pub struct ConnectionManager<C: Connector> {
    connector: C,
    policy: RetryPolicy,
    cancel: CancellationToken,
    stream: Option<C::Stream>,
    connects: u32,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            connector,
            policy,
            cancel,
            stream: None,
            connects: 0,
        }
    }

    /// Establish the stream and send the handshake
    ///
    /// Any existing stream is closed first. Failed attempts sleep for the
    /// policy delay before retrying. Returns [`BridgeError::Cancelled`] if the
    /// token fires while waiting and [`BridgeError::RetriesExhausted`] once a
    /// bounded policy runs out.
    pub fn connect(&mut self) -> Result<()> {
        self.close();
        log::info!("Waiting for MAME network output on {}", self.connector.describe());

        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(BridgeError::Cancelled);
            }

            attempt = attempt.saturating_add(1);
            if !self.policy.allows(attempt) {
                return Err(BridgeError::RetriesExhausted {
                    attempts: attempt - 1,
                });
            }

            match self.open_with_handshake() {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.connects = self.connects.saturating_add(1);
                    log::info!(
                        "Connected to MAME at {} (attempt {})",
                        self.connector.describe(),
                        attempt
                    );
                    return Ok(());
                }
                Err(e) => {
                    log::debug!("Connection attempt {} failed: {}", attempt, e);
                    if attempt == 1 {
                        log::warn!("Could not connect to MAME: {}", e);
                    }
                }
            }

            if !self.cancel.sleep(self.policy.delay()) {
                return Err(BridgeError::Cancelled);
            }
        }
    }

    fn open_with_handshake(&mut self) -> io::Result<C::Stream> {
        let mut stream = self.connector.open()?;
        stream.write_all(HANDSHAKE)?;
        stream.flush()?;
        Ok(stream)
    }

    /// Read the next chunk into `buf`
    ///
    /// Blocks until data arrives, the poll interval elapses, or the stream
    /// fails. Errors mean the caller should reconnect.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no stream to MAME"))?;

        match stream.read(buf) {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(ReadOutcome::Idle)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the current stream, if any
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("Closed stream to {}", self.connector.describe());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Number of streams established so far
    pub fn connect_count(&self) -> u32 {
        self.connects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Stream that replays scripted reads and records everything written
    struct ScriptedStream {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Connector that fails `failures` times, then hands out scripted streams
    struct FlakyConnector {
        failures: u32,
        opens: u32,
        reads: Vec<io::Result<Vec<u8>>>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl FlakyConnector {
        fn new(failures: u32, reads: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                failures,
                opens: 0,
                reads,
                written: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Connector for FlakyConnector {
        type Stream = ScriptedStream;

        fn open(&mut self) -> io::Result<ScriptedStream> {
            self.opens += 1;
            if self.opens <= self.failures {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            Ok(ScriptedStream {
                reads: self.reads.drain(..).collect(),
                written: Arc::clone(&self.written),
            })
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::bounded(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_connect_sends_handshake_once() {
        let connector = FlakyConnector::new(0, vec![]);
        let written = Arc::clone(&connector.written);
        let mut manager = ConnectionManager::new(connector, fast_policy(3), CancellationToken::new());

        manager.connect().unwrap();
        assert!(manager.is_connected());
        assert_eq!(manager.connect_count(), 1);
        assert_eq!(written.lock().unwrap().as_slice(), HANDSHAKE);
    }

    #[test]
    fn test_connect_retries_until_success() {
        let connector = FlakyConnector::new(2, vec![]);
        let mut manager = ConnectionManager::new(connector, fast_policy(3), CancellationToken::new());

        manager.connect().unwrap();
        assert_eq!(manager.connector.opens, 3);
    }

    #[test]
    fn test_connect_gives_up_after_policy_limit() {
        let connector = FlakyConnector::new(10, vec![]);
        let mut manager = ConnectionManager::new(connector, fast_policy(3), CancellationToken::new());

        let result = manager.connect();
        assert!(matches!(result, Err(BridgeError::RetriesExhausted { attempts: 3 })));
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_cancel_aborts_retry_loop() {
        let cancel = CancellationToken::new();
        let connector = FlakyConnector::new(u32::MAX, vec![]);
        let policy = RetryPolicy::unbounded(Duration::from_secs(60));
        let mut manager = ConnectionManager::new(connector, policy, cancel.clone());

        let canceller = std::thread::spawn({
            let cancel = cancel.clone();
            move || {
                std::thread::sleep(Duration::from_millis(100));
                cancel.cancel();
            }
        });

        let result = manager.connect();
        canceller.join().unwrap();
        assert!(matches!(result, Err(BridgeError::Cancelled)));
    }

    #[test]
    fn test_read_outcomes() {
        let reads = vec![
            Ok(b"Start_lamp = 1\r".to_vec()),
            Err(io::Error::new(io::ErrorKind::WouldBlock, "poll")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let connector = FlakyConnector::new(0, reads);
        let mut manager = ConnectionManager::new(connector, fast_policy(1), CancellationToken::new());
        manager.connect().unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(manager.read(&mut buf).unwrap(), ReadOutcome::Data(15));
        assert_eq!(&buf[..15], b"Start_lamp = 1\r");
        assert_eq!(manager.read(&mut buf).unwrap(), ReadOutcome::Idle);
        assert!(matches!(manager.read(&mut buf), Err(BridgeError::Io(_))));
        assert_eq!(manager.read(&mut buf).unwrap(), ReadOutcome::Closed);
    }

    #[test]
    fn test_read_without_stream_is_error() {
        let connector = FlakyConnector::new(0, vec![]);
        let mut manager = ConnectionManager::new(connector, fast_policy(1), CancellationToken::new());
        let mut buf = [0u8; 8];
        assert!(matches!(manager.read(&mut buf), Err(BridgeError::Io(_))));
    }

    #[test]
    fn test_token_sleep() {
        let token = CancellationToken::new();
        assert!(token.sleep(Duration::from_millis(5)));
        token.cancel();
        assert!(!token.sleep(Duration::from_secs(10)));
        assert!(token.is_cancelled());
    }
}
