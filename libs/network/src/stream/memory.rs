//! In-process stream pair
//!
//! Two [`MemoryStream`] ends joined by a pair of byte pipes. Reads block on
//! a condition variable until bytes arrive or either end closes.

use super::TwoWayStream;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use types::Contact;

#[derive(Default)]
struct PipeState {
    bytes: VecDeque<u8>,
    closed: bool,
}

#[derive(Default)]
struct Pipe {
    state: Mutex<PipeState>,
    ready: Condvar,
}

impl Pipe {
    fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }
}

/// One end of an in-memory duplex stream
pub struct MemoryStream {
    incoming: Arc<Pipe>,
    outgoing: Arc<Pipe>,
    name: String,
    ok: bool,
}

/// Build two connected ends
pub fn pair() -> (MemoryStream, MemoryStream) {
    let a_to_b = Arc::new(Pipe::default());
    let b_to_a = Arc::new(Pipe::default());
    (
        MemoryStream {
            incoming: b_to_a.clone(),
            outgoing: a_to_b.clone(),
            name: "memory/a".to_string(),
            ok: true,
        },
        MemoryStream {
            incoming: a_to_b,
            outgoing: b_to_a,
            name: "memory/b".to_string(),
            ok: true,
        },
    )
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.ok {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "stream closed"));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.incoming.state.lock();
        while state.bytes.is_empty() && !state.closed {
            self.incoming.ready.wait(&mut state);
        }
        let n = buf.len().min(state.bytes.len());
        for (slot, byte) in buf.iter_mut().zip(state.bytes.drain(..n)) {
            *slot = byte;
        }
        if n == 0 {
            drop(state);
            self.ok = false;
        }
        Ok(n)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.ok {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "stream closed"));
        }
        let mut state = self.outgoing.state.lock();
        if state.closed {
            drop(state);
            self.ok = false;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"));
        }
        state.bytes.extend(buf);
        drop(state);
        self.outgoing.ready.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl TwoWayStream for MemoryStream {
    fn interrupt(&mut self) {
        self.ok = false;
        self.incoming.close();
        self.outgoing.close();
    }

    fn close(&mut self) {
        self.interrupt();
    }

    fn is_ok(&self) -> bool {
        self.ok
    }

    fn local_address(&self) -> Contact {
        Contact::by_socket("local", self.name.clone(), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_pair_carries_bytes_both_ways() {
        let (mut a, mut b) = pair();
        a.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        b.write_all(b"pong").unwrap();
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn test_close_unblocks_reader() {
        let (mut a, mut b) = pair();
        let reader = thread::spawn(move || {
            let mut buf = [0u8; 1];
            b.read(&mut buf).unwrap()
        });
        a.close();
        assert_eq!(reader.join().unwrap(), 0);
        assert!(!a.is_ok());
    }
}
