//! # Line Protocol Parser
//!
//! Parse newline-terminated SKVS requests out of a TCP byte stream.
//!
//! ## Design Principles
//!
//! 1. **Stateless Parse**: [`parse_request`] looks at one buffer and returns
//!    exactly one outcome; it never remembers earlier calls.
//! 2. **Streaming Friendly**: [`LineBuffer`] accumulates reads and yields one
//!    complete line at a time, so a request split across reads is served once
//!    its terminator arrives.
//! 3. **Borrowed Tokens**: Keys and values are `&str` slices of the input; the
//!    engine copies what it keeps.
//! 4. **Bounded Memory**: Lines longer than [`BUFFER_SIZE`] are rejected and
//!    the rest of the line is skipped rather than buffered.

use bytes::{Buf, BytesMut};
use skvs_common::{BUFFER_SIZE, Command, LINE_TERMINATOR, key_fits};

/// One parsed request, borrowing from the input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    pub command: Command,
    pub key: &'a str,
    /// Present exactly for CREATE and UPDATE.
    pub value: Option<&'a str>,
}

/// Outcome of parsing one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed<'a> {
    /// No terminator yet and the buffer is below capacity.
    Incomplete,
    /// Malformed request; answered with `INVALID CMD`.
    Invalid,
    Request(Request<'a>),
}

/// Parses the first request line in `buf`.
///
/// Rules, in order:
/// 1. longer than [`BUFFER_SIZE`] is invalid;
/// 2. exactly [`BUFFER_SIZE`] must end in the terminator; shorter buffers
///    without a terminator are incomplete;
/// 3. the line is cut at the terminator (and a trailing `\r`) and split on
///    spaces;
/// 4. the command is matched case-insensitively;
/// 5. the key must be present and at most
///    [`MAX_KEY_LEN`](skvs_common::MAX_KEY_LEN) bytes;
/// 6. a value is required for CREATE/UPDATE, forbidden for READ/DELETE, and
///    nothing may follow it.
pub fn parse_request(buf: &[u8]) -> Parsed<'_> {
    if buf.len() > BUFFER_SIZE {
        return Parsed::Invalid;
    }

    let line = if buf.len() == BUFFER_SIZE {
        match buf.split_last() {
            Some((&LINE_TERMINATOR, line)) => line,
            _ => return Parsed::Invalid,
        }
    } else {
        match buf.iter().position(|&b| b == LINE_TERMINATOR) {
            Some(end) => &buf[..end],
            None => return Parsed::Incomplete,
        }
    };
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let Ok(line) = std::str::from_utf8(line) else {
        return Parsed::Invalid;
    };
    let mut tokens = line.split(' ').filter(|token| !token.is_empty());

    let Some(command) = tokens.next().and_then(Command::from_name) else {
        return Parsed::Invalid;
    };
    let Some(key) = tokens.next().filter(|key| key_fits(key)) else {
        return Parsed::Invalid;
    };
    let value = tokens.next();
    if command.takes_value() != value.is_some() || tokens.next().is_some() {
        return Parsed::Invalid;
    }

    Parsed::Request(Request {
        command,
        key,
        value,
    })
}

/// Returns true if `line` carries nothing but its terminator, which asks the
/// server to close the connection.
pub fn is_disconnect(line: &[u8]) -> bool {
    matches!(line, b"\n" | b"\r\n")
}

/// A unit of work cut from the connection's byte stream.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, terminator included.
    Line(BytesMut),
    /// A line exceeded [`BUFFER_SIZE`]; it is answered once as invalid.
    Overflow,
}

/// Per-connection read accumulator.
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
    // Skipping the tail of an overlong line until its terminator.
    discarding: bool,
}

impl LineBuffer {
    /// Creates an empty buffer sized for one maximal line.
    pub fn new() -> Self {
        LineBuffer {
            buf: BytesMut::with_capacity(BUFFER_SIZE),
            discarding: false,
        }
    }

    /// Appends freshly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Cuts the next frame, or returns `None` if more data is required.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let newline = self.buf.iter().position(|&b| b == LINE_TERMINATOR);

            if self.discarding {
                match newline {
                    Some(end) => {
                        self.buf.advance(end + 1);
                        self.discarding = false;
                        continue;
                    }
                    None => {
                        self.buf.clear();
                        return None;
                    }
                }
            }

            return match newline {
                Some(end) if end < BUFFER_SIZE => Some(Frame::Line(self.buf.split_to(end + 1))),
                Some(end) => {
                    self.buf.advance(end + 1);
                    Some(Frame::Overflow)
                }
                None if self.buf.len() >= BUFFER_SIZE => {
                    self.buf.clear();
                    self.discarding = true;
                    Some(Frame::Overflow)
                }
                None => None,
            };
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
    use skvs_common::MAX_KEY_LEN;

    fn request<'a>(command: Command, key: &'a str, value: Option<&'a str>) -> Parsed<'a> {
        Parsed::Request(Request {
            command,
            key,
            value,
        })
    }

    #[test]
    fn parses_each_command() {
        assert_eq!(
            parse_request(b"CREATE k v\n"),
            request(Command::Create, "k", Some("v"))
        );
        assert_eq!(parse_request(b"READ k\n"), request(Command::Read, "k", None));
        assert_eq!(
            parse_request(b"update k v2\n"),
            request(Command::Update, "k", Some("v2"))
        );
        assert_eq!(parse_request(b"Delete k\n"), request(Command::Delete, "k", None));
    }

    #[test]
    fn missing_terminator_is_incomplete() {
        assert_eq!(parse_request(b"CRE"), Parsed::Incomplete);
        assert_eq!(parse_request(b""), Parsed::Incomplete);
    }

    #[test]
    fn rejects_token_count_mismatches() {
        assert_eq!(parse_request(b"CREATE k\n"), Parsed::Invalid);
        assert_eq!(parse_request(b"UPDATE k\n"), Parsed::Invalid);
        assert_eq!(parse_request(b"READ k v\n"), Parsed::Invalid);
        assert_eq!(parse_request(b"DELETE k v\n"), Parsed::Invalid);
        assert_eq!(parse_request(b"CREATE k v extra\n"), Parsed::Invalid);
        assert_eq!(parse_request(b"READ\n"), Parsed::Invalid);
        assert_eq!(parse_request(b"\n"), Parsed::Invalid);
    }

    #[test]
    fn rejects_unknown_commands() {
        assert_eq!(parse_request(b"PUT k v\n"), Parsed::Invalid);
        assert_eq!(parse_request(b"CREATEX k v\n"), Parsed::Invalid);
    }

    #[test]
    fn enforces_key_length() {
        let ok = format!("READ {}\n", "k".repeat(MAX_KEY_LEN));
        let long = format!("READ {}\n", "k".repeat(MAX_KEY_LEN + 1));
        assert!(matches!(parse_request(ok.as_bytes()), Parsed::Request(_)));
        assert_eq!(parse_request(long.as_bytes()), Parsed::Invalid);
    }

    #[test]
    fn enforces_buffer_capacity() {
        let mut exact = vec![b'a'; BUFFER_SIZE];
        assert_eq!(parse_request(&exact), Parsed::Invalid);

        // A full buffer is acceptable only when its last byte terminates it.
        let head = b"CREATE k ";
        exact[..head.len()].copy_from_slice(head);
        exact[BUFFER_SIZE - 1] = b'\n';
        match parse_request(&exact) {
            Parsed::Request(req) => {
                assert_eq!(req.command, Command::Create);
                assert_eq!(req.value.map(str::len), Some(BUFFER_SIZE - head.len() - 1));
            }
            other => panic!("unexpected parse: {other:?}"),
        }

        let over = vec![b'a'; BUFFER_SIZE + 1];
        assert_eq!(parse_request(&over), Parsed::Invalid);
    }

    #[test]
    fn tolerates_repeated_spaces_and_crlf() {
        assert_eq!(
            parse_request(b"CREATE  k   v\r\n"),
            request(Command::Create, "k", Some("v"))
        );
    }

    #[test]
    fn rejects_non_utf8() {
        assert_eq!(parse_request(b"READ \xff\xfe\n"), Parsed::Invalid);
    }

    #[test]
    fn detects_disconnect_lines() {
        assert!(is_disconnect(b"\n"));
        assert!(is_disconnect(b"\r\n"));
        assert!(!is_disconnect(b"READ k\n"));
    }

    #[test]
    fn reassembles_split_lines() {
        let mut buf = LineBuffer::new();
        buf.extend(b"CRE");
        assert!(buf.next_frame().is_none());
        assert_eq!(parse_request(b"CRE"), Parsed::Incomplete);

        buf.extend(b"ATE k v\n");
        let Some(Frame::Line(line)) = buf.next_frame() else {
            panic!("expected a complete line");
        };
        assert_eq!(parse_request(&line), request(Command::Create, "k", Some("v")));
        assert!(buf.next_frame().is_none());
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn yields_pipelined_lines_in_order() {
        let mut buf = LineBuffer::new();
        buf.extend(b"READ a\nREAD b\nREA");
        assert_eq!(buf.next_frame(), Some(Frame::Line(BytesMut::from("READ a\n"))));
        assert_eq!(buf.next_frame(), Some(Frame::Line(BytesMut::from("READ b\n"))));
        assert_eq!(buf.next_frame(), None);
        assert_eq!(buf.pending(), 3);
    }

    #[test]
    fn overflow_is_reported_once_and_tail_skipped() {
        let mut buf = LineBuffer::new();
        buf.extend(&vec![b'x'; BUFFER_SIZE]);
        assert_eq!(buf.next_frame(), Some(Frame::Overflow));
        assert_eq!(buf.next_frame(), None);

        buf.extend(b"still the same line\nREAD k\n");
        assert_eq!(buf.next_frame(), Some(Frame::Line(BytesMut::from("READ k\n"))));
    }

    #[test]
    fn full_capacity_line_is_accepted() {
        let mut line = vec![b'y'; BUFFER_SIZE];
        line[BUFFER_SIZE - 1] = b'\n';
        let mut buf = LineBuffer::new();
        buf.extend(&line);
        assert!(matches!(buf.next_frame(), Some(Frame::Line(l)) if l.len() == BUFFER_SIZE));
    }

    #[test]
    fn overlong_line_with_terminator_overflows() {
        let mut line = vec![b'z'; BUFFER_SIZE + 10];
        line.push(b'\n');
        let mut buf = LineBuffer::new();
        // Only the second read crosses capacity.
        buf.extend(&line[..100]);
        assert_eq!(buf.next_frame(), None);
        buf.extend(&line[100..]);
        assert_eq!(buf.next_frame(), Some(Frame::Overflow));
        assert_eq!(buf.next_frame(), None);
        assert_eq!(buf.pending(), 0);
    }
}
