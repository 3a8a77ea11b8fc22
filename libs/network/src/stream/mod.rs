//! Duplex byte streams under a protocol
//!
//! A [`TwoWayStream`] is the only thing a [`Protocol`](crate::Protocol)
//! knows about the network. Socket-backed streams come from
//! [`SocketStream`]; [`memory::pair`] builds an in-process pair for
//! hosting code that wants to loop a port back on itself.

use std::io::{Read, Write};
use types::Contact;

pub mod memory;
pub mod socket;

pub use memory::{pair, MemoryStream};
pub use socket::{InterruptHandle, SocketStream};

/// Bidirectional byte stream owned by one protocol
pub trait TwoWayStream: Read + Write + Send {
    /// Mark the start of a logical message
    fn begin_packet(&mut self) {}

    /// Mark the end of a logical message
    fn end_packet(&mut self) {}

    /// Abort any blocked read or write; later calls fail fast
    fn interrupt(&mut self);

    /// Release the underlying resource
    fn close(&mut self);

    /// False once the stream has failed or been closed
    fn is_ok(&self) -> bool;

    fn local_address(&self) -> Contact {
        Contact::empty()
    }

    fn remote_address(&self) -> Contact {
        Contact::empty()
    }
}
