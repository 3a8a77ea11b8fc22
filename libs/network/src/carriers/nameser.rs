//! Raw name-server command carrier
//!
//! Lets a bare socket client type `NAME_SERVER query /foo` with no
//! handshake at all. The 8 header bytes are the start of the first command,
//! so they are pushed back and read again as part of the first line.

use super::{Carrier, CarrierCapabilities, ConnectionState};
use crate::Result;
use codec::{BufferedWriter, FRAME_LEN};

const MAGIC: &[u8; FRAME_LEN] = b"NAME_SER";

#[derive(Default)]
pub struct NameserCarrier;

impl NameserCarrier {
    pub fn new() -> Self {
        Self
    }
}

impl Carrier for NameserCarrier {
    fn create(&self) -> Box<dyn Carrier> {
        Box::new(Self)
    }

    fn name(&self) -> &str {
        "name_ser"
    }

    fn check_header(&self, header: &[u8]) -> bool {
        header == MAGIC
    }

    fn header(&self) -> [u8; FRAME_LEN] {
        *MAGIC
    }

    fn capabilities(&self) -> CarrierCapabilities {
        CarrierCapabilities {
            can_accept: true,
            is_text_mode: true,
            support_reply: true,
            ..Default::default()
        }
    }

    /// The header was the command's first bytes; nothing else to send
    fn send_header(&mut self, _state: &mut ConnectionState) -> Result<()> {
        Ok(())
    }

    fn expect_sender_specifier(&mut self, state: &mut ConnectionState) -> Result<()> {
        state.push_back(MAGIC);
        let route = state.route().clone().with_from("anonymous");
        state.set_route(route);
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

    fn send_ack(&mut self, _state: &mut ConnectionState) -> Result<()> {
        Ok(())
    }

    fn expect_ack(&mut self, _state: &mut ConnectionState) -> Result<()> {
        Ok(())
    }
}
