//! Bencode codec
//!
//! A strict bencode decoder/encoder. The decoder only accepts canonical
//! form (sorted dictionary keys, no redundant leading zeros), which makes
//! `encode(parse_exact(b)) == b` hold for every accepted input. That
//! literal-preservation property is what allows the info-hash to be computed
//! over the raw bytes of the `info` dictionary.
//!
//! Bencode format:
//! - Integers:   `i<number>e`        Example: `i42e`
//! - Strings:    `<length>:<data>`   Example: `4:spam`
//! - Lists:      `l<items>e`         Example: `l4:spami42ee`
//! - Dicts:      `d<pairs>e`         Example: `d3:cow3:moo4:spam4:eggse`

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use crate::error::{ClientError, Result};

/// Maximum allowed length for a bencode string (100 MiB).
/// Prevents malicious torrents from causing memory exhaustion.
const MAX_STRING_LENGTH: u64 = 100 * 1024 * 1024;

/// A bencode value.
#[derive(Clone, PartialEq, Eq)]
pub enum Value {
    /// Integer value (can be negative)
    Integer(i64),
    /// Byte string (not necessarily valid UTF-8)
    Bytes(Vec<u8>),
    /// List of values
    List(Vec<Value>),
    /// Dictionary with byte string keys (sorted by key)
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "Integer({})", n),
            Self::Bytes(b) => {
                if let Ok(s) = std::str::from_utf8(b) {
                    if s.len() <= 50 {
                        write!(f, "Bytes(\"{}\")", s)
                    } else {
                        write!(f, "Bytes(\"{}...\" [{} bytes])", &s[..50], b.len())
                    }
                } else {
                    write!(f, "Bytes([{} bytes])", b.len())
                }
            }
            Self::List(l) => f.debug_tuple("List").field(l).finish(),
            Self::Dict(d) => {
                let readable: BTreeMap<String, &Value> = d
                    .iter()
                    .map(|(k, v)| (String::from_utf8_lossy(k).to_string(), v))
                    .collect();
                f.debug_tuple("Dict").field(&readable).finish()
            }
        }
    }
}

/// Result of parsing one bencode value, with the unparsed tail.
pub struct ParseResult<'a> {
    /// The parsed value
    pub value: Value,
    /// The remaining unparsed bytes
    pub remaining: &'a [u8],
}

/// Byte cursor over the input. Every production starts at the current
/// position and leaves the cursor on the first byte it did not consume,
/// so error messages can point at an exact offset.
struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn fail(&self, what: impl fmt::Display) -> ClientError {
        ClientError::decode(format!("{} (at byte {})", what, self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Consume `marker` if it is the next byte.
    fn eat(&mut self, marker: u8) -> bool {
        if self.peek() == Some(marker) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Canonical unsigned decimal: at least one digit, and no leading zero
    /// unless the number is exactly `0`.
    fn number(&mut self) -> Result<u64> {
        let first = match self.peek() {
            Some(d @ b'0'..=b'9') => d,
            _ => return Err(self.fail("expected digit")),
        };

        let mut magnitude = 0u64;
        let mut digits = 0usize;
        while let Some(d @ b'0'..=b'9') = self.peek() {
            magnitude = magnitude
                .checked_mul(10)
                .and_then(|m| m.checked_add(u64::from(d - b'0')))
                .ok_or_else(|| self.fail("number out of range"))?;
            self.pos += 1;
            digits += 1;
        }

        if first == b'0' && digits > 1 {
            return Err(self.fail("leading zero"));
        }
        Ok(magnitude)
    }

    /// One value of any of the four productions.
    fn value(&mut self) -> Result<Value> {
        match self.peek() {
            Some(b'i') => self.integer(),
            Some(b'l') => self.list(),
            Some(b'd') => self.dict(),
            Some(b'0'..=b'9') => self.string().map(Value::Bytes),
            Some(other) => Err(self.fail(format_args!(
                "invalid type marker {:?}",
                other as char
            ))),
            None => Err(self.fail("unexpected end of input")),
        }
    }

    /// `i<digits>e`, rejecting `-0` and anything with a redundant zero.
    fn integer(&mut self) -> Result<Value> {
        self.pos += 1; // 'i'
        let negative = self.eat(b'-');
        let magnitude = self.number()?;
        if !self.eat(b'e') {
            return Err(self.fail("unterminated integer"));
        }

        let n = if negative {
            if magnitude == 0 {
                return Err(self.fail("negative zero"));
            }
            if magnitude > i64::MAX as u64 + 1 {
                return Err(self.fail("integer out of range"));
            }
            // i64::MIN has no positive counterpart; wrapping covers it.
            (magnitude as i64).wrapping_neg()
        } else {
            i64::try_from(magnitude).map_err(|_| self.fail("integer out of range"))?
        };

        Ok(Value::Integer(n))
    }

    /// `<length>:<bytes>`.
    fn string(&mut self) -> Result<Vec<u8>> {
        let length = self.number()?;
        if length > MAX_STRING_LENGTH {
            return Err(self.fail(format_args!(
                "string of {} bytes exceeds the {} byte cap",
                length, MAX_STRING_LENGTH
            )));
        }
        if !self.eat(b':') {
            return Err(self.fail("expected ':' after string length"));
        }

        let end = self.pos + length as usize;
        let bytes = self
            .input
            .get(self.pos..end)
            .ok_or_else(|| self.fail("string runs past end of input"))?;
        self.pos = end;
        Ok(bytes.to_vec())
    }

    /// `l<values>e`.
    fn list(&mut self) -> Result<Value> {
        self.pos += 1; // 'l'
        let mut items = Vec::new();
        loop {
            if self.eat(b'e') {
                return Ok(Value::List(items));
            }
            if self.peek().is_none() {
                return Err(self.fail("unterminated list"));
            }
            items.push(self.value()?);
        }
    }

    /// `d(<key><value>)*e` with keys in strictly ascending byte order.
    fn dict(&mut self) -> Result<Value> {
        self.pos += 1; // 'd'
        let mut entries = BTreeMap::new();
        loop {
            if self.eat(b'e') {
                return Ok(Value::Dict(entries));
            }
            let key = match self.peek() {
                Some(b'0'..=b'9') => self.string()?,
                Some(_) => return Err(self.fail("dict key must be a string")),
                None => return Err(self.fail("unterminated dict")),
            };
            // Strictly ascending also rules out duplicates.
            if entries.last_key_value().is_some_and(|(last, _)| *last >= key) {
                return Err(self.fail("dict keys out of order"));
            }
            let value = self.value()?;
            entries.insert(key, value);
        }
    }
}

impl Value {
    /// Parse one bencode value from the front of `data`.
    pub fn parse(data: &[u8]) -> Result<ParseResult<'_>> {
        let mut parser = Parser::new(data);
        let value = parser.value()?;
        Ok(ParseResult {
            value,
            remaining: &data[parser.pos..],
        })
    }

    /// Parse a complete bencode value, rejecting trailing data.
    pub fn parse_exact(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let value = parser.value()?;
        if parser.pos != data.len() {
            return Err(ClientError::decode(format!(
                "{} trailing bytes after value",
                data.len() - parser.pos
            )));
        }
        Ok(value)
    }

    /// Encode to bencode bytes. Dictionary keys come out in lexicographic
    /// order, so this is the exact inverse of `parse_exact`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::Integer(n) => {
                // Writes to a Vec cannot fail.
                let _ = write!(out, "i{}e", n);
            }
            Self::Bytes(bytes) => write_string(out, bytes),
            Self::List(items) => {
                out.push(b'l');
                for item in items {
                    item.write_to(out);
                }
                out.push(b'e');
            }
            Self::Dict(entries) => {
                out.push(b'd');
                for (key, value) in entries {
                    write_string(out, key);
                    value.write_to(out);
                }
                out.push(b'e');
            }
        }
    }

    // Accessor methods

    /// Get as string (UTF-8)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as unsigned integer
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Integer(n) if *n >= 0 => Some(*n as u64),
            _ => None,
        }
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get as list
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Get as dict
    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Self::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Get dict value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Dict(d) => d.get(key.as_bytes()),
            _ => None,
        }
    }
}

/// Length-prefixed string form shared by byte strings and dict keys.
fn write_string(out: &mut Vec<u8>, bytes: &[u8]) {
    let _ = write!(out, "{}:", bytes.len());
    out.extend_from_slice(bytes);
}

/// Find the raw bytes of the `info` dictionary inside a `.torrent` file.
///
/// The info-hash is the SHA-1 over exactly these bytes, so the span is taken
/// from the original input rather than a re-encoding.
pub fn info_dict_bytes(data: &[u8]) -> Result<&[u8]> {
    let mut parser = Parser::new(data);
    if !parser.eat(b'd') {
        return Err(ClientError::metainfo("root is not a dict"));
    }

    while !parser.eat(b'e') {
        let key = parser.string()?;
        let start = parser.pos;
        parser.value()?;
        if key == b"info" {
            return Ok(&data[start..parser.pos]);
        }
    }

    Err(ClientError::metainfo("missing 'info' key"))
}
