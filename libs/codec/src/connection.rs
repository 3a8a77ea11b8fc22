//! Reader and writer seams between payload types and connections
//!
//! ## Purpose
//!
//! Payload types never see sockets. They serialize into a
//! [`ConnectionWriter`] and deserialize from a [`ConnectionReader`]; the
//! protocol engine supplies concrete implementations scoped to one message.
//!
//! ```text
//! PortWriter ──write()──► ConnectionWriter ──► carrier ──► stream
//! PortReader ◄──read()─── ConnectionReader ◄── carrier ◄── stream
//! ```
//!
//! All fixed-width integers and floats are in network byte order.

use crate::error::{CodecError, Result};
use std::io::Read;

/// Sink for one outgoing message
pub trait ConnectionWriter {
    /// Copy `data` into the message
    fn append_bytes(&mut self, data: &[u8]);

    /// True when the message body is already printable text
    fn is_text_mode(&self) -> bool;

    /// Request that a binary body be rendered as one text line at write time
    fn convert_text_mode(&mut self) -> bool;

    fn append_i8(&mut self, value: i8) {
        self.append_bytes(&value.to_be_bytes());
    }

    fn append_i16(&mut self, value: i16) {
        self.append_bytes(&value.to_be_bytes());
    }

    fn append_i32(&mut self, value: i32) {
        self.append_bytes(&value.to_be_bytes());
    }

    fn append_i64(&mut self, value: i64) {
        self.append_bytes(&value.to_be_bytes());
    }

    fn append_f32(&mut self, value: f32) {
        self.append_bytes(&value.to_be_bytes());
    }

    fn append_f64(&mut self, value: f64) {
        self.append_bytes(&value.to_be_bytes());
    }

    fn append_text(&mut self, text: &str) {
        self.append_bytes(text.as_bytes());
    }
}

/// Source for one incoming message
pub trait ConnectionReader {
    /// Fill `buf` completely or fail
    fn expect_block(&mut self, buf: &mut [u8]) -> Result<()>;

    /// True when the payload is line-oriented text
    fn is_text_mode(&self) -> bool;

    /// Bytes left in the current message, if the carrier framed it
    fn size(&self) -> Option<usize>;

    /// Writer for a reply travelling back on the same connection
    fn writer(&mut self) -> Option<&mut dyn ConnectionWriter> {
        None
    }

    /// False once the connection has been closed under the reader
    fn is_active(&self) -> bool {
        true
    }

    fn expect_i8(&mut self) -> Result<i8> {
        let mut buf = [0u8; 1];
        self.expect_block(&mut buf)?;
        Ok(i8::from_be_bytes(buf))
    }

    fn expect_i16(&mut self) -> Result<i16> {
        let mut buf = [0u8; 2];
        self.expect_block(&mut buf)?;
        Ok(i16::from_be_bytes(buf))
    }

    fn expect_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.expect_block(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    fn expect_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.expect_block(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    fn expect_f32(&mut self) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.expect_block(&mut buf)?;
        Ok(f32::from_be_bytes(buf))
    }

    fn expect_f64(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.expect_block(&mut buf)?;
        Ok(f64::from_be_bytes(buf))
    }

    /// Read up to and including `\n`, returning the line without `\r\n`
    fn expect_line(&mut self) -> Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            self.expect_block(&mut byte)?;
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line).map_err(|_| CodecError::utf8("text line"))
    }
}

/// Value that can serialize itself onto a connection
pub trait PortWriter {
    fn write(&self, writer: &mut dyn ConnectionWriter) -> Result<()>;
}

/// Value that can load itself from a connection
pub trait PortReader {
    fn read(&mut self, reader: &mut dyn ConnectionReader) -> Result<()>;
}

impl ConnectionWriter for Vec<u8> {
    fn append_bytes(&mut self, data: &[u8]) {
        self.extend_from_slice(data);
    }

    fn is_text_mode(&self) -> bool {
        false
    }

    fn convert_text_mode(&mut self) -> bool {
        false
    }
}

/// In-memory reader over a complete message
#[derive(Debug)]
pub struct BytesReader<'a> {
    data: &'a [u8],
    position: usize,
    text_mode: bool,
}

impl<'a> BytesReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            text_mode: false,
        }
    }

    pub fn text(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            text_mode: true,
        }
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl ConnectionReader for BytesReader<'_> {
    fn expect_block(&mut self, buf: &mut [u8]) -> Result<()> {
        let available = self.data.len() - self.position;
        if buf.len() > available {
            return Err(CodecError::Truncated {
                need: buf.len(),
                available,
            });
        }
        let mut source = &self.data[self.position..self.position + buf.len()];
        source.read_exact(buf)?;
        self.position += buf.len();
        Ok(())
    }

    fn is_text_mode(&self) -> bool {
        self.text_mode
    }

    fn size(&self) -> Option<usize> {
        Some(self.data.len() - self.position)
    }
}
