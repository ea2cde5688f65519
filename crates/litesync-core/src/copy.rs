//! Streaming parser for the Postgres `COPY ... TO STDOUT` text format.
//!
//! The parser is a one-shot, forward-only transducer: raw chunks go in (with
//! arbitrary boundaries) and a flat sequence of fields comes out, one per tab
//! or newline delimiter. It knows nothing about rows, types or tables; the
//! caller counts columns to find row boundaries.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// A single decoded field. `None` is SQL NULL (`\N` on the wire).
pub type CopyField = Option<Bytes>;

const TAB: u8 = b'\t';
const NEWLINE: u8 = b'\n';
const BACKSLASH: u8 = b'\\';

/// Result of the byte following a backslash.
enum Escape {
    Byte(u8),
    Null,
}

fn unescape(byte: u8) -> Option<Escape> {
    let mapped = match byte {
        b'N' => return Some(Escape::Null),
        b'\\' => b'\\',
        b'b' => 0x08,
        b'f' => 0x0C,
        b'n' => b'\n',
        b'r' => b'\r',
        b't' => b'\t',
        b'v' => 0x0B,
        _ => return None,
    };
    Some(Escape::Byte(mapped))
}

/// Bytes collected for the field currently being read.
///
/// The common case is a field that lies entirely inside one chunk with no
/// escapes; that is kept as a zero-copy slice of the chunk. Only fields that
/// straddle chunks or contain escapes are copied into an owned buffer.
#[derive(Debug, Default)]
enum Accumulated {
    #[default]
    Empty,
    Null,
    One(Bytes),
    Many(BytesMut),
}

impl Accumulated {
    fn append(&mut self, segment: Bytes) -> Result<()> {
        if segment.is_empty() {
            return Ok(());
        }
        match self {
            Accumulated::Empty => *self = Accumulated::One(segment),
            Accumulated::Null => return Err(Error::DataAfterNullMarker),
            Accumulated::One(first) => {
                let mut buf = BytesMut::with_capacity(first.len() + segment.len());
                buf.extend_from_slice(first);
                buf.extend_from_slice(&segment);
                *self = Accumulated::Many(buf);
            }
            Accumulated::Many(buf) => buf.extend_from_slice(&segment),
        }
        Ok(())
    }

    fn push(&mut self, byte: u8) -> Result<()> {
        match self {
            Accumulated::Empty => {
                let mut buf = BytesMut::with_capacity(16);
                buf.put_u8(byte);
                *self = Accumulated::Many(buf);
            }
            Accumulated::Null => return Err(Error::DataAfterNullMarker),
            Accumulated::One(first) => {
                let mut buf = BytesMut::with_capacity(first.len() + 16);
                buf.extend_from_slice(first);
                buf.put_u8(byte);
                *self = Accumulated::Many(buf);
            }
            Accumulated::Many(buf) => buf.put_u8(byte),
        }
        Ok(())
    }

    fn mark_null(&mut self) -> Result<()> {
        match self {
            Accumulated::Empty => {
                *self = Accumulated::Null;
                Ok(())
            }
            _ => Err(Error::DataAfterNullMarker),
        }
    }

    fn take(&mut self) -> CopyField {
        match std::mem::take(self) {
            Accumulated::Empty => Some(Bytes::new()),
            Accumulated::Null => None,
            Accumulated::One(bytes) => Some(bytes),
            Accumulated::Many(buf) => Some(buf.freeze()),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Accumulated::Empty)
    }
}

/// Stateful parser for one COPY TEXT stream.
///
/// Feed chunks in order with [`CopyTextParser::parse`]; each call yields the
/// fields completed by that chunk. Call [`CopyTextParser::finish`] once the
/// stream ends to detect a truncated trailing field.
#[derive(Debug, Default)]
pub struct CopyTextParser {
    accumulated: Accumulated,
    escaped: bool,
    values: Vec<CopyField>,
}

impl CopyTextParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk, returning the fields it completed.
    ///
    /// The returned drain borrows an internal buffer that is reused across
    /// calls, so it must be consumed before the next chunk is parsed.
    pub fn parse(&mut self, chunk: Bytes) -> Result<std::vec::Drain<'_, CopyField>> {
        self.values.clear();

        let len = chunk.len();
        let mut l = 0;
        let mut r = 0;
        while r < len {
            if self.escaped {
                match unescape(chunk[r]) {
                    Some(Escape::Null) => self.accumulated.mark_null()?,
                    Some(Escape::Byte(byte)) => self.accumulated.push(byte)?,
                    None => return Err(Error::UnknownEscape(chunk[r])),
                }
                self.escaped = false;
                r += 1;
                l = r;
                continue;
            }

            let Some(offset) = chunk[r..]
                .iter()
                .position(|&b| b == TAB || b == NEWLINE || b == BACKSLASH)
            else {
                break;
            };
            r += offset;

            self.accumulated.append(chunk.slice(l..r))?;
            if chunk[r] == BACKSLASH {
                self.escaped = true;
            } else {
                let value = self.accumulated.take();
                self.values.push(value);
            }
            r += 1;
            l = r;
        }

        // The trailing segment belongs to a field that is not yet known to be
        // complete; carry it into the next chunk.
        if l < len {
            self.accumulated.append(chunk.slice(l..))?;
        }

        Ok(self.values.drain(..))
    }

    /// Verify that the stream ended on a field boundary.
    pub fn finish(&self) -> Result<()> {
        if self.escaped || !self.accumulated.is_empty() {
            return Err(Error::TruncatedField);
        }
        Ok(())
    }
}
