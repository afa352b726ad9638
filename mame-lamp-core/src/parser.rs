//! Line-oriented record parser
//!
//! MAME's network output is a stream of `\r`-terminated `key = value` lines.
//! Raw bytes are decoded to text here, once, so everything downstream works
//! with plain strings.

use crate::types::Record;

/// Byte terminating each line of the output stream
pub const LINE_SEPARATOR: u8 = b'\r';

/// Separator between key and value inside a line
pub const KEY_VALUE_SEPARATOR: char = '=';

/// Default upper bound for an unterminated line held by [`LineBuffer`]
pub const DEFAULT_MAX_PENDING: usize = 4096;

/// Stateless parser turning one chunk into records
pub struct MessageParser;

impl MessageParser {
    /// Parse a single line (without separator)
    ///
    /// Returns `None` for lines without a `=`; such lines are noise
    /// (HTTP headers, blank lines, garbled frames).
    pub fn parse_line(line: &[u8]) -> Option<Record> {
        let text = String::from_utf8_lossy(line);
        let (key, value) = text.split_once(KEY_VALUE_SEPARATOR)?;
        Some(Record::new(key.trim(), value.trim()))
    }

    /// Lazily parse every line of a chunk, in order
    pub fn records(chunk: &[u8]) -> impl Iterator<Item = Record> + '_ {
        chunk.split(|&b| b == LINE_SEPARATOR).filter_map(|line| {
            let record = Self::parse_line(line);
            if record.is_none() && !line.is_empty() {
                log::trace!("Dropping line without separator: {:?}", String::from_utf8_lossy(line));
            }
            record
        })
    }

    /// Parse a chunk into a vector of records
    pub fn parse_chunk(chunk: &[u8]) -> Vec<Record> {
        Self::records(chunk).collect()
    }
}

/// Parser that carries an unterminated trailing line over to the next chunk
///
/// A read can end in the middle of a line. Only complete lines are parsed;
/// the tail is kept until its separator arrives. A tail that grows past
/// `max_pending` bytes is dropped along with the rest of its line.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_pending: usize,
    /// Skipping the remainder of an oversized line
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }

    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_pending,
            discarding: false,
        }
    }

    /// Feed a chunk and return the records from every line it completes
    pub fn push(&mut self, mut chunk: &[u8]) -> Vec<Record> {
        if self.discarding {
            let Some(end) = chunk.iter().position(|&b| b == LINE_SEPARATOR) else {
                return Vec::new();
            };
            self.discarding = false;
            chunk = &chunk[end + 1..];
        }

        let Some(last_separator) = chunk.iter().rposition(|&b| b == LINE_SEPARATOR) else {
            self.hold(chunk);
            return Vec::new();
        };

        let (complete, tail) = chunk.split_at(last_separator + 1);
        let records = if self.pending.is_empty() {
            MessageParser::parse_chunk(complete)
        } else {
            self.pending.extend_from_slice(complete);
            let joined = std::mem::take(&mut self.pending);
            MessageParser::parse_chunk(&joined)
        };

        self.hold(tail);
        records
    }

    /// Forget any partial line (e.g. after the stream was re-established)
    pub fn clear(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }

    /// Bytes currently waiting for a line separator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn hold(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > self.max_pending {
            log::warn!(
                "Discarding {} bytes of unterminated input (limit {})",
                self.pending.len(),
                self.max_pending
            );
            self.pending.clear();
            self.discarding = true;
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk() {
        let records = MessageParser::parse_chunk(b"Start_lamp = 1\rBrake_lamp = 0\r");
        assert_eq!(
            records,
            vec![Record::new("Start_lamp", "1"), Record::new("Brake_lamp", "0")]
        );
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let record = MessageParser::parse_line(b"  mame_start=outrun \n").unwrap();
        assert_eq!(record, Record::new("mame_start", "outrun"));
    }

    #[test]
    fn test_splits_on_first_separator_only() {
        let record = MessageParser::parse_line(b"key = a = b").unwrap();
        assert_eq!(record.key, "key");
        assert_eq!(record.value, "a = b");
    }

    #[test]
    fn test_noise_lines_are_skipped() {
        let chunk = b"HTTP/1.1 200 OK\r\n\r\nStart_lamp = 1\rgarbage\r\r";
        let records = MessageParser::parse_chunk(chunk);
        assert_eq!(records, vec![Record::new("Start_lamp", "1")]);
    }

    #[test]
    fn test_empty_chunk() {
        assert!(MessageParser::parse_chunk(b"").is_empty());
    }

    #[test]
    fn test_invalid_utf8_does_not_panic() {
        let records = MessageParser::parse_chunk(b"Start\xFF_lamp = 1\r");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, "1");
    }

    #[test]
    fn test_parsing_is_repeatable() {
        let chunk = b"a = 1\rb = 0\rnoise\r";
        assert_eq!(MessageParser::parse_chunk(chunk), MessageParser::parse_chunk(chunk));
    }

    #[test]
    fn test_line_buffer_joins_split_lines() {
        let mut buffer = LineBuffer::new();

        let first = buffer.push(b"Start_lamp = 1\rBrake_la");
        assert_eq!(first, vec![Record::new("Start_lamp", "1")]);
        assert_eq!(buffer.pending_len(), 8);

        let second = buffer.push(b"mp = 1\r");
        assert_eq!(second, vec![Record::new("Brake_lamp", "1")]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_line_buffer_chunk_without_separator() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"Start_").is_empty());
        assert!(buffer.push(b"lamp = ").is_empty());
        assert_eq!(buffer.push(b"1\r"), vec![Record::new("Start_lamp", "1")]);
    }

    #[test]
    fn test_line_buffer_discards_oversized_tail() {
        let mut buffer = LineBuffer::with_max_pending(8);
        assert!(buffer.push(b"0123456789").is_empty());
        assert_eq!(buffer.pending_len(), 0);

        // The end of the dropped line is skipped, the next line parses
        assert_eq!(buffer.push(b"abc\ra = 1\r"), vec![Record::new("a", "1")]);
    }

    #[test]
    fn test_line_buffer_skips_end_of_oversized_line() {
        let mut buffer = LineBuffer::with_max_pending(8);
        assert!(buffer.push(b"some_output_").is_empty());

        // "led1 = 1" is the tail of "some_output_led1 = 1", not a line of its own
        assert!(buffer.push(b"led1 = 1\r").is_empty());
        assert_eq!(buffer.push(b"led0 = 1\r"), vec![Record::new("led0", "1")]);
    }

    #[test]
    fn test_line_buffer_skips_across_several_chunks() {
        let mut buffer = LineBuffer::with_max_pending(4);
        assert!(buffer.push(b"Start_").is_empty());
        assert!(buffer.push(b"lamp").is_empty());
        assert!(buffer.push(b" = 1").is_empty());
        assert!(buffer.push(b"\r").is_empty());
        assert_eq!(buffer.push(b"b = 0\r"), vec![Record::new("b", "0")]);
    }

    #[test]
    fn test_line_buffer_clear_stops_skipping() {
        let mut buffer = LineBuffer::with_max_pending(4);
        assert!(buffer.push(b"Start_lamp").is_empty());
        buffer.clear();
        assert_eq!(buffer.push(b"a = 1\r"), vec![Record::new("a", "1")]);
    }

    #[test]
    fn test_line_buffer_clear() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"Start_lamp = ");
        buffer.clear();
        assert_eq!(buffer.push(b"1\r"), Vec::<Record>::new());
    }
}
