//! TCP-backed stream
//!
//! Reads go through a buffered reader so line-oriented carriers do not pay a
//! syscall per byte. Writes are buffered until the end of each packet or an
//! explicit flush, so a message leaves in as few segments as possible.

use super::TwoWayStream;
use crate::{Result, TransportError};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;
use types::Contact;

pub struct SocketStream {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    control: TcpStream,
    local: Contact,
    remote: Contact,
    ok: bool,
}

impl SocketStream {
    /// Connect to the host and port named by `contact`
    pub fn connect(contact: &Contact) -> Result<Self> {
        Self::connect_timeout(contact, None)
    }

    pub fn connect_timeout(contact: &Contact, timeout: Option<Duration>) -> Result<Self> {
        if !contact.is_valid() {
            return Err(TransportError::transport(format!(
                "cannot connect to unresolved contact {}",
                contact
            )));
        }
        let address = contact.socket_address();
        let stream = match timeout {
            Some(limit) => {
                let target = address
                    .to_socket_addrs()?
                    .next()
                    .ok_or_else(|| TransportError::transport(format!("no address for {}", address)))?;
                TcpStream::connect_timeout(&target, limit)
            }
            None => TcpStream::connect(&address),
        }
        .map_err(|e| TransportError::transport_with_source(format!("connect to {} failed", address), e))?;

        debug!(remote = %address, "socket stream connected");
        Self::from_tcp(stream)
    }

    /// Wrap an already connected socket, e.g. one returned by `accept`
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let local = stream
            .local_addr()
            .map(|a| Contact::by_socket("tcp", a.ip().to_string(), i32::from(a.port())))
            .unwrap_or_default();
        let remote = stream
            .peer_addr()
            .map(|a| Contact::by_socket("tcp", a.ip().to_string(), i32::from(a.port())))
            .unwrap_or_default();
        let control = stream.try_clone()?;
        let writer = BufWriter::new(stream.try_clone()?);
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            control,
            local,
            remote,
            ok: true,
        })
    }

    /// Handle that can abort this stream from another thread
    pub fn interrupt_handle(&self) -> Result<InterruptHandle> {
        Ok(InterruptHandle {
            socket: self.control.try_clone()?,
        })
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.control.set_read_timeout(timeout)?;
        Ok(())
    }

    fn track<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if result.is_err() {
            self.ok = false;
        }
        result
    }
}

impl Read for SocketStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.ok {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "stream closed"));
        }
        let result = self.reader.read(buf);
        if matches!(result, Ok(0)) && !buf.is_empty() {
            self.ok = false;
        }
        self.track(result)
    }
}

impl Write for SocketStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.ok {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "stream closed"));
        }
        let result = self.writer.write(buf);
        self.track(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.writer.flush();
        self.track(result)
    }
}

impl TwoWayStream for SocketStream {
    fn end_packet(&mut self) {
        if let Err(e) = self.flush() {
            debug!(error = %e, "flush at end of packet failed");
        }
    }

    fn interrupt(&mut self) {
        self.ok = false;
        if let Err(e) = self.control.shutdown(Shutdown::Both) {
            debug!(error = %e, "socket shutdown during interrupt failed");
        }
    }

    fn close(&mut self) {
        if self.ok {
            let _ = self.writer.flush();
        }
        self.interrupt();
    }

    fn is_ok(&self) -> bool {
        self.ok
    }

    fn local_address(&self) -> Contact {
        self.local.clone()
    }

    fn remote_address(&self) -> Contact {
        self.remote.clone()
    }
}

/// Cross-thread handle that shuts a socket stream down
pub struct InterruptHandle {
    socket: TcpStream,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            debug!(error = %e, "socket already shut down");
        }
    }
}
