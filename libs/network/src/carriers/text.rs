//! Human-typable text carrier
//!
//! A client opens with `CONNECT <name>\r\n` (or `CONNACK` for the
//! acknowledged variant) and is greeted with `Welcome <name>\r\n`. Messages
//! are plain lines with no index; the acknowledged variant confirms each
//! one with `<ACK>\r\n` and supports replies.

use super::{Carrier, CarrierCapabilities, ConnectionState};
use crate::{Result, TransportError};
use codec::{BufferedWriter, FRAME_LEN};
use tracing::debug;

const CONNECT: &[u8; FRAME_LEN] = b"CONNECT ";
const CONNACK: &[u8; FRAME_LEN] = b"CONNACK ";
const ACK_LINE: &str = "<ACK>";

pub struct TextCarrier {
    ack_variant: bool,
}

impl TextCarrier {
    /// Unacknowledged variant, registered as `text`
    pub fn new() -> Self {
        Self { ack_variant: false }
    }

    /// Acknowledged variant, registered as `text_ack`
    pub fn with_ack() -> Self {
        Self { ack_variant: true }
    }

    fn magic(&self) -> &'static [u8; FRAME_LEN] {
        if self.ack_variant {
            CONNACK
        } else {
            CONNECT
        }
    }
}

impl Default for TextCarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Carrier for TextCarrier {
    fn create(&self) -> Box<dyn Carrier> {
        Box::new(Self {
            ack_variant: self.ack_variant,
        })
    }

    fn name(&self) -> &str {
        if self.ack_variant {
            "text_ack"
        } else {
            "text"
        }
    }

    fn check_header(&self, header: &[u8]) -> bool {
        header == self.magic()
    }

    fn header(&self) -> [u8; FRAME_LEN] {
        *self.magic()
    }

    fn capabilities(&self) -> CarrierCapabilities {
        CarrierCapabilities {
            can_accept: true,
            can_offer: true,
            is_text_mode: true,
            require_ack: self.ack_variant,
            support_reply: self.ack_variant,
            is_push: true,
            ..Default::default()
        }
    }

    fn send_header(&mut self, state: &mut ConnectionState) -> Result<()> {
        let from = state.route().from_name().to_string();
        state.write_all(self.magic())?;
        state.write_all(format!("{}\r\n", from).as_bytes())?;
        state.flush()
    }

    fn expect_sender_specifier(&mut self, state: &mut ConnectionState) -> Result<()> {
        let from = state.read_line()?;
        let from = from.trim().to_string();
        debug!(from = %from, carrier = self.name(), "text sender specified");
        let route = state.route().clone().with_from(from);
        state.set_route(route);
        Ok(())
    }

    fn respond_to_header(&mut self, state: &mut ConnectionState) -> Result<()> {
        let from = state.route().from_name().to_string();
        state.write_all(format!("Welcome {}\r\n", from).as_bytes())?;
        state.flush()
    }

    fn expect_reply_to_header(&mut self, state: &mut ConnectionState) -> Result<()> {
        let greeting = state.read_line()?;
        debug!(greeting = %greeting, "text handshake answered");
        Ok(())
    }

    fn send_index(&mut self, _state: &mut ConnectionState, _writer: &mut BufferedWriter<'_>) -> Result<()> {
        Ok(())
    }

    fn expect_index(&mut self, state: &mut ConnectionState) -> Result<()> {
        state.set_message_len(None);
        Ok(())
    }

    fn reply(&mut self, state: &mut ConnectionState, writer: &mut BufferedWriter<'_>) -> Result<()> {
        super::framing::write_payload(state, writer)
    }

    fn send_ack(&mut self, state: &mut ConnectionState) -> Result<()> {
        if !self.ack_variant {
            return Ok(());
        }
        state.write_all(format!("{}\r\n", ACK_LINE).as_bytes())?;
        state.flush()
    }

    fn expect_ack(&mut self, state: &mut ConnectionState) -> Result<()> {
        if !self.ack_variant {
            return Ok(());
        }
        let line = state.read_line()?;
        if line.trim() != ACK_LINE {
            return Err(TransportError::protocol(format!(
                "expected {}, got {:?}",
                ACK_LINE, line
            )));
        }
        Ok(())
    }
}
