//! RESP2 codec
//!
//! The subset of the Redis serialization protocol a sentinel client needs:
//! commands go out as arrays of bulk strings, replies come back as any of the
//! five RESP2 types (plus the nil forms of bulk strings and arrays).


use std::fmt;

use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;

/// Nested arrays deeper than this are rejected
const MAX_NESTING_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Need more data to complete parsing
    #[error("incomplete data")]
    Incomplete,

    /// Invalid RESP format
    #[error("invalid format: {0}")]
    Invalid(String),
}

/// A single decoded RESP2 value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    /// `None` is the nil bulk string (`$-1`)
    BulkString(Option<Bytes>),
    /// `None` is the nil array (`*-1`)
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Textual content of a simple or bulk string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s.as_str()),
            RespValue::BulkString(Some(b)) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, RespValue::BulkString(None) | RespValue::Array(None))
    }

    /// Consumes a non-nil array, returning its elements
    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(Some(items)) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for RespValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "+{s}"),
            RespValue::Error(e) => write!(f, "-{e}"),
            RespValue::Integer(n) => write!(f, ":{n}"),
            RespValue::BulkString(None) | RespValue::Array(None) => write!(f, "(nil)"),
            RespValue::BulkString(Some(b)) => write!(f, "{:?}", String::from_utf8_lossy(b)),
            RespValue::Array(Some(items)) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Encode a command as a RESP array of bulk strings
pub fn encode_command(args: &[&str]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(16 + args.iter().map(|a| a.len() + 16).sum::<usize>());
    buf.put_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        buf.put_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.put_slice(arg.as_bytes());
        buf.put_slice(b"\r\n");
    }
    buf
}

/// Parse one RESP value from the front of `buffer`
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete value,
/// otherwise the value and the number of bytes it occupied.
pub fn parse_value(buffer: &[u8]) -> Result<Option<(RespValue, usize)>, ParseError> {
    match parse_at(buffer, 0, 0) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(ParseError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

fn parse_at(
    buffer: &[u8],
    pos: usize,
    depth: usize,
) -> Result<(RespValue, usize), ParseError> {
    let tag = *buffer.get(pos).ok_or(ParseError::Incomplete)?;
    let (line, next) = read_line(buffer, pos + 1)?;

    match tag {
        b'+' => Ok((RespValue::SimpleString(utf8(line)?), next)),
        b'-' => Ok((RespValue::Error(utf8(line)?), next)),
        b':' => Ok((RespValue::Integer(parse_integer(line)?), next)),
        b'$' => {
            let len = parse_integer(line)?;
            if len < 0 {
                return Ok((RespValue::BulkString(None), next));
            }
            let end = next + len as usize;
            if buffer.len() < end + 2 {
                return Err(ParseError::Incomplete);
            }
            if &buffer[end..end + 2] != b"\r\n" {
                return Err(ParseError::Invalid("bulk string not terminated by CRLF".to_string()));
            }
            let data = Bytes::copy_from_slice(&buffer[next..end]);
            Ok((RespValue::BulkString(Some(data)), end + 2))
        }
        b'*' => {
            let len = parse_integer(line)?;
            if len < 0 {
                return Ok((RespValue::Array(None), next));
            }
            if depth >= MAX_NESTING_DEPTH {
                return Err(ParseError::Invalid("array nesting too deep".to_string()));
            }
            let len = len as usize;
            let mut items = Vec::with_capacity(len.min(64));
            let mut cursor = next;
            for _ in 0..len {
                let (item, consumed_to) = parse_at(buffer, cursor, depth + 1)?;
                items.push(item);
                cursor = consumed_to;
            }
            Ok((RespValue::Array(Some(items)), cursor))
        }
        other => Err(ParseError::Invalid(format!("unknown type byte {:?}", other as char))),
    }
}

/// Returns the line starting at `start` (without CRLF) and the offset after it
fn read_line(
    buffer: &[u8],
    start: usize,
) -> Result<(&[u8], usize), ParseError> {
    let rest = buffer.get(start..).ok_or(ParseError::Incomplete)?;
    let end = rest
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or(ParseError::Incomplete)?;
    Ok((&rest[..end], start + end + 2))
}

fn parse_integer(line: &[u8]) -> Result<i64, ParseError> {
    std::str::from_utf8(line)
        .map_err(|_| ParseError::Invalid("invalid utf8 in integer".to_string()))?
        .parse()
        .map_err(|_| ParseError::Invalid("invalid integer".to_string()))
}

fn utf8(line: &[u8]) -> Result<String, ParseError> {
    String::from_utf8(line.to_vec()).map_err(|_| ParseError::Invalid("invalid utf8 in line".to_string()))
}
