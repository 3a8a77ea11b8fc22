//! Carrier Strategy Layer
//!
//! ## Purpose
//!
//! A carrier is the transport-specific half of a connection. It decides the
//! 8 header bytes that open a connection, the handshake that follows, how
//! each message is framed, and whether messages are acknowledged. The
//! [`Protocol`](crate::Protocol) engine drives the hooks below in a fixed
//! order and never looks at transport details itself.
//!
//! ## Hook Order
//!
//! ```text
//! initiator                              acceptor
//! ─────────                              ────────
//! prepare_send                           (header read, carrier chosen)
//! send_header          ───────────►      set_parameters
//!                                        expect_sender_specifier
//!                                        expect_extra_header
//! expect_reply_to_header ◄───────────    respond_to_header
//!
//! per message:
//! send_index + write   ───────────►      expect_index, respond_to_index
//! (expect_reply)       ◄───────────      reply
//! expect_ack           ◄───────────      send_ack
//! ```
//!
//! ## Registry
//!
//! [`CarrierRegistry`] holds one prototype per carrier. Incoming headers are
//! offered to prototypes in registration order and the first match wins;
//! outgoing connections pick a carrier by name. Either way the registry
//! returns a fresh instance, so prototypes are never mutated.

use crate::Result;
use codec::{BufferedWriter, FRAME_LEN};
use std::time::Duration;
use types::Contact;

pub mod checksum;
pub mod datagram;
pub mod framing;
pub mod nameser;
pub mod registry;
pub mod shmem;
pub mod state;
pub mod tcp;
pub mod text;


pub use checksum::ChecksumCarrier;
pub use datagram::{McastCarrier, UdpCarrier};
pub use nameser::NameserCarrier;
pub use registry::CarrierRegistry;
pub use shmem::ShmemCarrier;
pub use state::ConnectionState;
pub use tcp::TcpCarrier;
pub use text::TextCarrier;

/// Static facts about a carrier, queried without side effects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CarrierCapabilities {
    pub is_connectionless: bool,
    pub is_broadcast: bool,
    pub can_accept: bool,
    pub can_offer: bool,
    pub is_text_mode: bool,
    pub can_escape: bool,
    pub require_ack: bool,
    pub support_reply: bool,
    pub is_local: bool,
    pub is_push: bool,
}

/// Result of a carrier-driven out-of-band connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The carrier has no special connect logic
    NotAttempted = -1,
    Connected = 0,
    Failed = 1,
}

/// Caller preferences for [`Carrier::connect`]
#[derive(Debug, Clone, Default)]
pub struct ContactStyle {
    pub quiet: bool,
    pub admin: bool,
    pub persistent: bool,
    pub timeout: Option<Duration>,
}

/// Transport strategy for one connection
///
/// Every hook has a default matching a plain stream transport, so a
/// carrier only overrides what it does differently.
pub trait Carrier: Send + Sync {
    /// Fresh instance of the same kind
    fn create(&self) -> Box<dyn Carrier>;

    fn name(&self) -> &str;

    /// Does this carrier claim these 8 header bytes
    fn check_header(&self, header: &[u8]) -> bool;

    /// The 8 bytes this carrier opens a connection with
    fn header(&self) -> [u8; FRAME_LEN];

    /// Configure from the header that selected this carrier
    fn set_parameters(&mut self, _header: &[u8]) {}

    fn capabilities(&self) -> CarrierCapabilities;

    /// False for logical connections that should skip actual writes
    fn is_active(&self) -> bool {
        true
    }

    fn modifies_incoming_data(&self) -> bool {
        false
    }

    fn modify_incoming_data(&mut self, data: Vec<u8>) -> Vec<u8> {
        data
    }

    /// Returning false drops the current incoming message
    fn accept_incoming_data(&mut self, _data: &[u8]) -> bool {
        true
    }

    fn modifies_outgoing_data(&self) -> bool {
        false
    }

    fn modify_outgoing_data(&mut self, data: Vec<u8>) -> Vec<u8> {
        data
    }

    fn prepare_send(&mut self, _state: &mut ConnectionState) -> Result<()> {
        Ok(())
    }

    fn send_header(&mut self, state: &mut ConnectionState) -> Result<()> {
        state.write_all(&self.header())?;
        framing::send_sender_specifier(state)?;
        state.flush()
    }

    fn expect_reply_to_header(&mut self, _state: &mut ConnectionState) -> Result<()> {
        Ok(())
    }

    fn expect_sender_specifier(&mut self, state: &mut ConnectionState) -> Result<()> {
        framing::expect_sender_specifier(state)
    }

    fn expect_extra_header(&mut self, _state: &mut ConnectionState) -> Result<()> {
        Ok(())
    }

    fn respond_to_header(&mut self, _state: &mut ConnectionState) -> Result<()> {
        Ok(())
    }

    /// Send one message: index then payload
    fn write(&mut self, state: &mut ConnectionState, writer: &mut BufferedWriter<'_>) -> Result<()> {
        self.send_index(state, writer)?;
        framing::write_payload(state, writer)
    }

    fn send_index(&mut self, state: &mut ConnectionState, writer: &mut BufferedWriter<'_>) -> Result<()> {
        framing::send_index(state, writer.size())
    }

    fn expect_index(&mut self, state: &mut ConnectionState) -> Result<()> {
        framing::expect_index(state)
    }

    fn respond_to_index(&mut self, _state: &mut ConnectionState) -> Result<()> {
        Ok(())
    }

    /// Send a reply for the message just read
    fn reply(&mut self, state: &mut ConnectionState, writer: &mut BufferedWriter<'_>) -> Result<()> {
        state.set_reply_expected(false);
        self.write(state, writer)
    }

    /// Prepare to read the reply to the message just written
    fn expect_reply(&mut self, state: &mut ConnectionState) -> Result<()> {
        self.expect_index(state)
    }

    fn send_ack(&mut self, state: &mut ConnectionState) -> Result<()> {
        framing::send_ack(state)
    }

    fn expect_ack(&mut self, state: &mut ConnectionState) -> Result<()> {
        framing::expect_ack(state)
    }

    /// Carrier-specific connection setup outside the stream handshake
    fn connect(
        &mut self,
        _src: &Contact,
        _dest: &Contact,
        _style: &ContactStyle,
        _mode: i32,
        _reversed: bool,
    ) -> ConnectOutcome {
        ConnectOutcome::NotAttempted
    }

    fn close(&mut self) {}
}
