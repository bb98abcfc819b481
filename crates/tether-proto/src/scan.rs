//! Incremental scanner for browser -> server traffic.
//!
//! A message is literal keystroke data until a sentinel byte (0x92, or its
//! UTF-8 encoding 0xC2 0x92) introduces an event line `NAME SP DATA LF`.
//! The scanner never mutates its input; whatever it cannot finish yet is left
//! in [`Scanner::remainder`] for the caller to prepend to the next message.

/// Sentinel byte introducing an embedded event.
pub const SENTINEL: u8 = 0x92;

/// First byte of the UTF-8 encoding of [`SENTINEL`].
const SENTINEL_LEAD: u8 = 0xc2;

/// An event line split into its name and data, still as raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent<'a> {
    pub name: &'a [u8],
    pub data: &'a [u8],
}

impl<'a> RawEvent<'a> {
    /// Event name as text; names are ASCII so anything else reads as empty.
    pub fn name(&self) -> &'a str {
        std::str::from_utf8(self.name).unwrap_or("")
    }
}

/// One unit of inbound traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Bytes to be written verbatim to the pseudo-terminal.
    Literal(&'a [u8]),
    /// A complete embedded event.
    Event(RawEvent<'a>),
}

/// Splits a byte buffer into [`Token`]s.
pub struct Scanner<'a> {
    buf: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            done: false,
        }
    }

    /// Number of bytes fully handed out as tokens so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// Bytes not yet handed out: an incomplete event, or a trailing lead byte
    /// that may turn out to be half of a sentinel.
    pub fn remainder(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Scan literal bytes from `start`, returning the index of the first
    /// sentinel (or held-back lead byte), or the buffer length.
    fn literal_end(&self, start: usize) -> usize {
        let buf = self.buf;
        let mut i = start;
        while i < buf.len() {
            match buf[i] {
                SENTINEL => break,
                SENTINEL_LEAD if i + 1 == buf.len() => break,
                SENTINEL_LEAD if buf[i + 1] == SENTINEL => break,
                _ => i += 1,
            }
        }
        i
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if self.done {
            return None;
        }
        let buf = self.buf;
        let start = self.pos;
        let end = self.literal_end(start);

        if end > start {
            self.pos = end;
            return Some(Token::Literal(&buf[start..end]));
        }
        if end == buf.len() || (buf[end] == SENTINEL_LEAD && end + 1 == buf.len()) {
            self.done = true;
            return None;
        }

        let body = if buf[end] == SENTINEL_LEAD { end + 2 } else { end + 1 };
        let Some(eol) = buf[body..].iter().position(|&b| b == b'\n').map(|off| body + off) else {
            self.done = true;
            return None;
        };

        let line = &buf[body..eol];
        let name_end = line.iter().position(|&b| b == b' ').unwrap_or(line.len());
        let mut data = &line[name_end..];
        while let [b' ', rest @ ..] = data {
            data = rest;
        }

        self.pos = eol + 1;
        Some(Token::Event(RawEvent {
            name: &line[..name_end],
            data,
        }))
    }
}
