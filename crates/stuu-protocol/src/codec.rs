//! MessagePack-compatible value codec.
//!
//! Only the tag families the engine exchanges are supported:
//!
//! | Category          | Tags                          |
//! |-------------------|-------------------------------|
//! | nil / bool        | `c0`, `c2`, `c3`              |
//! | fixint            | `00..=7f`, `e0..=ff`          |
//! | uint 8/16/32/64   | `cc`, `cd`, `ce`, `cf`        |
//! | int 8/16/32/64    | `d0`, `d1`, `d2`, `d3`        |
//! | float 32/64       | `ca` (decode only), `cb`      |
//! | str               | `a0..=bf`, `d9`, `da`, `db`   |
//! | array             | `90..=9f`, `dc`, `dd`         |
//! | map               | `80..=8f`, `de`, `df`         |
//!
//! The encoder always picks the smallest representation. All multi-byte
//! quantities are big-endian.

use crate::error::DecodeError;
use crate::value::{Map, Value};

/// Deepest array/map nesting accepted by [`decode`].
pub const MAX_DECODE_DEPTH: usize = 64;

/// Encodes `value` into a fresh buffer.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

/// Appends the encoding of `value` to `out`.
///
/// Lengths above `u32::MAX` are not representable; callers keep strings,
/// arrays and maps below that bound.
pub fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(0xc0),
        Value::Bool(false) => out.push(0xc2),
        Value::Bool(true) => out.push(0xc3),
        Value::Int(n) => encode_int(*n, out),
        Value::Float(n) => {
            out.push(0xcb);
            out.extend_from_slice(&n.to_be_bytes());
        }
        Value::Str(s) => encode_str(s, out),
        Value::Arr(items) => {
            encode_len(items.len(), 0x90, 15, [0xdc, 0xdd], out);
            for item in items {
                encode_into(item, out);
            }
        }
        Value::Map(map) => {
            encode_len(map.len(), 0x80, 15, [0xde, 0xdf], out);
            for (key, entry) in map {
                encode_str(key, out);
                encode_into(entry, out);
            }
        }
    }
}

fn encode_int(n: i64, out: &mut Vec<u8>) {
    if n >= 0 {
        let u = n as u64;
        if u <= 0x7f {
            out.push(u as u8);
        } else if u <= u64::from(u8::MAX) {
            out.push(0xcc);
            out.push(u as u8);
        } else if u <= u64::from(u16::MAX) {
            out.push(0xcd);
            out.extend_from_slice(&(u as u16).to_be_bytes());
        } else if u <= u64::from(u32::MAX) {
            out.push(0xce);
            out.extend_from_slice(&(u as u32).to_be_bytes());
        } else {
            out.push(0xcf);
            out.extend_from_slice(&u.to_be_bytes());
        }
    } else if n >= -32 {
        out.push(n as i8 as u8);
    } else if n >= i64::from(i8::MIN) {
        out.push(0xd0);
        out.push(n as i8 as u8);
    } else if n >= i64::from(i16::MIN) {
        out.push(0xd1);
        out.extend_from_slice(&(n as i16).to_be_bytes());
    } else if n >= i64::from(i32::MIN) {
        out.push(0xd2);
        out.extend_from_slice(&(n as i32).to_be_bytes());
    } else {
        out.push(0xd3);
        out.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_str(s: &str, out: &mut Vec<u8>) {
    let len = s.len();
    if len <= 31 {
        out.push(0xa0 | len as u8);
    } else if len <= usize::from(u8::MAX) {
        out.push(0xd9);
        out.push(len as u8);
    } else if len <= usize::from(u16::MAX) {
        out.push(0xda);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(0xdb);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
    out.extend_from_slice(s.as_bytes());
}

/// Writes a container header: fix form up to `fix_max`, then 16- or 32-bit.
fn encode_len(len: usize, fix_base: u8, fix_max: usize, wide: [u8; 2], out: &mut Vec<u8>) {
    if len <= fix_max {
        out.push(fix_base | len as u8);
    } else if len <= usize::from(u16::MAX) {
        out.push(wide[0]);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(wide[1]);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
}

/// Decodes one value from the front of `bytes`.
///
/// Returns the value and the number of bytes it occupied. Trailing bytes are
/// left alone; whether they are an error is the caller's decision.
///
/// # Errors
///
/// Any [`DecodeError`]. Nothing is consumed on failure.
pub fn decode(bytes: &[u8]) -> Result<(Value, usize), DecodeError> {
    let mut decoder = Decoder { bytes, pos: 0 };
    let value = decoder.read_value(0)?;
    Ok((value, decoder.pos))
}

struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn read_value(&mut self, depth: usize) -> Result<Value, DecodeError> {
        let tag = self.read_u8()?;
        match tag {
            0x00..=0x7f => Ok(Value::Int(i64::from(tag))),
            0xe0..=0xff => Ok(Value::Int(i64::from(tag as i8))),
            0x80..=0x8f => self.read_map(usize::from(tag & 0x0f), depth),
            0x90..=0x9f => self.read_array(usize::from(tag & 0x0f), depth),
            0xa0..=0xbf => self.read_str(usize::from(tag & 0x1f)),
            0xc0 => Ok(Value::Null),
            0xc2 => Ok(Value::Bool(false)),
            0xc3 => Ok(Value::Bool(true)),
            0xca => {
                let bits = u32::from_be_bytes(self.read_fixed()?);
                Ok(Value::Float(f64::from(f32::from_bits(bits))))
            }
            0xcb => Ok(Value::Float(f64::from_be_bytes(self.read_fixed()?))),
            0xcc => Ok(Value::Int(i64::from(self.read_u8()?))),
            0xcd => Ok(Value::Int(i64::from(u16::from_be_bytes(
                self.read_fixed()?,
            )))),
            0xce => Ok(Value::Int(i64::from(u32::from_be_bytes(
                self.read_fixed()?,
            )))),
            0xcf => {
                let raw = u64::from_be_bytes(self.read_fixed()?);
                // Out of i64 range: keep the magnitude as a double.
                Ok(match i64::try_from(raw) {
                    Ok(n) => Value::Int(n),
                    Err(_) => Value::Float(raw as f64),
                })
            }
            0xd0 => Ok(Value::Int(i64::from(self.read_u8()? as i8))),
            0xd1 => Ok(Value::Int(i64::from(i16::from_be_bytes(
                self.read_fixed()?,
            )))),
            0xd2 => Ok(Value::Int(i64::from(i32::from_be_bytes(
                self.read_fixed()?,
            )))),
            0xd3 => Ok(Value::Int(i64::from_be_bytes(self.read_fixed()?))),
            0xd9 => {
                let len = usize::from(self.read_u8()?);
                self.read_str(len)
            }
            0xda => {
                let len = self.read_len16()?;
                self.read_str(len)
            }
            0xdb => {
                let len = self.read_len32()?;
                self.read_str(len)
            }
            0xdc => {
                let len = self.read_len16()?;
                self.read_array(len, depth)
            }
            0xdd => {
                let len = self.read_len32()?;
                self.read_array(len, depth)
            }
            0xde => {
                let len = self.read_len16()?;
                self.read_map(len, depth)
            }
            0xdf => {
                let len = self.read_len32()?;
                self.read_map(len, depth)
            }
            other => Err(DecodeError::UnsupportedTag(other)),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.bytes.len() - self.pos;
        if n > remaining {
            return Err(DecodeError::UnexpectedEnd {
                offset: self.pos,
                needed: n,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn read_len16(&mut self) -> Result<usize, DecodeError> {
        Ok(usize::from(u16::from_be_bytes(self.read_fixed()?)))
    }

    fn read_len32(&mut self) -> Result<usize, DecodeError> {
        Ok(u32::from_be_bytes(self.read_fixed()?) as usize)
    }

    fn read_str(&mut self, len: usize) -> Result<Value, DecodeError> {
        let offset = self.pos;
        let raw = self.take(len)?;
        let text = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8 { offset })?;
        Ok(Value::Str(text.to_string()))
    }

    fn read_array(&mut self, len: usize, depth: usize) -> Result<Value, DecodeError> {
        let depth = self.descend(depth)?;
        // Every element takes at least one byte; never trust the header for capacity.
        let mut items = Vec::with_capacity(len.min(self.bytes.len() - self.pos));
        for _ in 0..len {
            items.push(self.read_value(depth)?);
        }
        Ok(Value::Arr(items))
    }

    fn read_map(&mut self, len: usize, depth: usize) -> Result<Value, DecodeError> {
        let depth = self.descend(depth)?;
        let mut map = Map::new();
        for _ in 0..len {
            let key = match self.read_value(depth)? {
                Value::Str(key) => key,
                _ => return Err(DecodeError::NonStringMapKey),
            };
            let value = self.read_value(depth)?;
            map.insert(key, value);
        }
        Ok(Value::Map(map))
    }

    fn descend(&self, depth: usize) -> Result<usize, DecodeError> {
        if depth >= MAX_DECODE_DEPTH {
            return Err(DecodeError::DepthExceeded {
                max: MAX_DECODE_DEPTH,
            });
        }
        Ok(depth + 1)
    }
}
