//! Length-prefixed framing.
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  encoded Value   |
//! +----------------+------------------+
//! ```
//!
//! [`FrameBuffer`] reassembles frames from arbitrarily chunked reads (the
//! server's non-blocking path). [`FrameReader`] and [`FrameWriter`] wrap
//! blocking `std::io` streams for simple clients.

use std::io::{Read, Write};

use crate::MAX_FRAME_SIZE;
use crate::codec;
use crate::error::{ProtocolError, ProtocolResult};
use crate::value::Value;

/// Size of the length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Encodes `value` and prefixes it with its big-endian length.
///
/// # Errors
///
/// [`ProtocolError::FrameTooLarge`] when the body exceeds [`MAX_FRAME_SIZE`].
pub fn encode_frame(value: &Value) -> ProtocolResult<Vec<u8>> {
    let mut buffer = vec![0u8; FRAME_HEADER_LEN];
    codec::encode_into(value, &mut buffer);

    let body_len = buffer.len() - FRAME_HEADER_LEN;
    if body_len > MAX_FRAME_SIZE as usize {
        return Err(ProtocolError::FrameTooLarge {
            size: body_len,
            max: MAX_FRAME_SIZE,
        });
    }

    buffer[..FRAME_HEADER_LEN].copy_from_slice(&(body_len as u32).to_be_bytes());
    Ok(buffer)
}

/// Decodes a frame body that must hold exactly one value.
///
/// # Errors
///
/// [`ProtocolError::Decode`] for malformed bodies and
/// [`ProtocolError::TrailingBytes`] when bytes remain after the value.
pub fn decode_body(body: &[u8]) -> ProtocolResult<Value> {
    let (value, used) = codec::decode(body)?;
    if used != body.len() {
        return Err(ProtocolError::TrailingBytes {
            remaining: body.len() - used,
        });
    }
    Ok(value)
}

/// Incremental frame reassembly over a growing byte buffer.
#[derive(Debug)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
    max_frame_size: u32,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// Creates an empty buffer with the protocol's size limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Creates an empty buffer with a custom size limit.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: Vec::with_capacity(8192),
            max_frame_size,
        }
    }

    /// Appends bytes read from the connection.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes waiting for a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Removes and returns the next complete frame body.
    ///
    /// Returns `Ok(None)` when more bytes are needed; nothing is consumed in
    /// that case. Call repeatedly until it yields `None` to drain every
    /// complete frame.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::FrameTooLarge`] as soon as the header declares an
    /// oversized body. The body is never awaited and the connection should
    /// be closed.
    pub fn next_frame(&mut self) -> ProtocolResult<Option<Vec<u8>>> {
        let Some(header) = self.buffer.first_chunk::<FRAME_HEADER_LEN>() else {
            return Ok(None);
        };

        let size = u32::from_be_bytes(*header);
        if size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: size as usize,
                max: self.max_frame_size,
            });
        }

        let end = FRAME_HEADER_LEN + size as usize;
        if self.buffer.len() < end {
            return Ok(None);
        }

        let body = self.buffer[FRAME_HEADER_LEN..end].to_vec();
        self.buffer.drain(..end);
        Ok(Some(body))
    }
}

/// Reads whole frames from a blocking stream.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: Read> FrameReader<R> {
    /// Creates a new FrameReader wrapping the given reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads and decodes the next frame.
    ///
    /// Returns `Ok(None)` on a clean EOF before any header byte.
    pub fn read_value(&mut self) -> ProtocolResult<Option<Value>> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        let mut filled = 0;
        while filled < FRAME_HEADER_LEN {
            match self.reader.read(&mut header[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(ProtocolError::IncompleteFrame {
                        expected: FRAME_HEADER_LEN,
                        received: filled,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        let size = u32::from_be_bytes(header);
        if size > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: size as usize,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut body = vec![0u8; size as usize];
        self.reader.read_exact(&mut body).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ProtocolError::IncompleteFrame {
                    expected: size as usize,
                    received: 0,
                }
            } else {
                e.into()
            }
        })?;

        decode_body(&body).map(Some)
    }

    /// Returns a mutable reference to the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }
}

/// Writes whole frames to a blocking stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    /// Creates a new FrameWriter wrapping the given writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Encodes, frames and writes `value`, then flushes.
    pub fn write_value(&mut self, value: &Value) -> ProtocolResult<()> {
        let frame = encode_frame(value)?;
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Unwraps this FrameWriter, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
