//! Per-connection state shared between a protocol and its carrier
//!
//! Carrier hooks receive `&mut ConnectionState` rather than the whole
//! protocol: the stream, the route, and the framing facts the current
//! message needs (payload length, whether a reply was requested).

use crate::stream::TwoWayStream;
use crate::{Result, TransportError};
use codec::{create_yarp_number, interpret_yarp_number, FRAME_LEN};
use std::collections::VecDeque;
use std::io;
use types::{Contact, Route};

/// Longest text line accepted during a handshake
const MAX_LINE: usize = 10_000;

pub struct ConnectionState {
    stream: Option<Box<dyn TwoWayStream>>,
    route: Route,
    pushback: VecDeque<u8>,
    message_len: Option<usize>,
    reply_expected: bool,
    data_port: Option<i32>,
    remote_data_port: Option<i32>,
}

impl ConnectionState {
    pub fn new(stream: Box<dyn TwoWayStream>) -> Self {
        Self {
            stream: Some(stream),
            route: Route::default(),
            pushback: VecDeque::new(),
            message_len: None,
            reply_expected: false,
            data_port: None,
            remote_data_port: None,
        }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn set_route(&mut self, route: Route) {
        self.route = route;
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_ok(&self) -> bool {
        self.stream.as_ref().map(|s| s.is_ok()).unwrap_or(false)
    }

    pub fn stream_mut(&mut self) -> Result<&mut (dyn TwoWayStream + 'static)> {
        self.stream
            .as_deref_mut()
            .ok_or_else(TransportError::no_connection)
    }

    pub(crate) fn take_stream(&mut self) -> Option<Box<dyn TwoWayStream>> {
        self.pushback.clear();
        self.stream.take()
    }

    pub(crate) fn give_stream(&mut self, stream: Box<dyn TwoWayStream>) {
        self.stream = Some(stream);
    }

    pub fn remote_address(&self) -> Contact {
        self.stream
            .as_ref()
            .map(|s| s.remote_address())
            .unwrap_or_default()
    }

    pub fn local_address(&self) -> Contact {
        self.stream
            .as_ref()
            .map(|s| s.local_address())
            .unwrap_or_default()
    }

    /// Payload bytes announced by the last index, `None` for unframed text
    pub fn message_len(&self) -> Option<usize> {
        self.message_len
    }

    pub fn set_message_len(&mut self, len: Option<usize>) {
        self.message_len = len;
    }

    pub fn reply_expected(&self) -> bool {
        self.reply_expected
    }

    pub fn set_reply_expected(&mut self, expected: bool) {
        self.reply_expected = expected;
    }

    /// Port this side offers for out-of-band data (datagram carriers)
    pub fn data_port(&self) -> Option<i32> {
        self.data_port
    }

    pub fn set_data_port(&mut self, port: Option<i32>) {
        self.data_port = port;
    }

    /// Port the peer announced for out-of-band data
    pub fn remote_data_port(&self) -> Option<i32> {
        self.remote_data_port
    }

    pub fn set_remote_data_port(&mut self, port: Option<i32>) {
        self.remote_data_port = port;
    }

    /// Make `bytes` the next thing read, ahead of the stream
    pub fn push_back(&mut self, bytes: &[u8]) {
        for b in bytes.iter().rev() {
            self.pushback.push_front(*b);
        }
    }

    /// Raw read used by message readers; errors stay `io::Error`
    pub(crate) fn read_exact_io(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.pushback.pop_front() {
                Some(b) => {
                    buf[filled] = b;
                    filled += 1;
                }
                None => break,
            }
        }
        if filled == buf.len() {
            return Ok(());
        }
        match self.stream.as_deref_mut() {
            Some(stream) => stream.read_exact(&mut buf[filled..]),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "no connection")),
        }
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.read_exact_io(buf)
            .map_err(|e| TransportError::transport_with_source("stream died", e))
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream_mut()?
            .write_all(bytes)
            .map_err(|e| TransportError::transport_with_source("stream died", e))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stream_mut()?
            .flush()
            .map_err(|e| TransportError::transport_with_source("stream died", e))
    }

    pub fn write_yarp_number(&mut self, value: i32) -> Result<()> {
        self.write_all(&create_yarp_number(value))
    }

    /// Read one integer frame; bad magic is a protocol mismatch
    pub fn read_yarp_number(&mut self) -> Result<i32> {
        let mut frame = [0u8; FRAME_LEN];
        self.read_exact(&mut frame)?;
        let value = interpret_yarp_number(&frame);
        if value < 0 {
            return Err(TransportError::protocol(format!(
                "expected integer frame, got {}",
                String::from_utf8_lossy(&frame).escape_debug()
            )));
        }
        Ok(value)
    }

    /// Read a `\n`-terminated line without its line ending
    pub fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            self.read_exact(&mut byte)?;
            if byte[0] == b'\n' {
                break;
            }
            if line.len() >= MAX_LINE {
                return Err(TransportError::protocol("handshake line too long"));
            }
            line.push(byte[0]);
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line).map_err(|_| TransportError::protocol("handshake line is not UTF-8"))
    }

    /// Read and drop `count` bytes
    pub fn discard(&mut self, count: usize) -> Result<()> {
        let mut scratch = [0u8; 256];
        let mut left = count;
        while left > 0 {
            let n = left.min(scratch.len());
            self.read_exact(&mut scratch[..n])?;
            left -= n;
        }
        Ok(())
    }
}
