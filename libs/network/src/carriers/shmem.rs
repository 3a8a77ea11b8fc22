//! Shared-memory carrier handshake
//!
//! Negotiates a local data port the same way the datagram carriers do.
//! The shared segment itself lives in the hosting layer; messages keep the
//! binary index and acknowledgement on the stream.

use super::tcp::{specifier, CODE_SHMEM};
use super::{Carrier, CarrierCapabilities, ConnectionState};
use crate::Result;
use codec::{create_yarp_number, interpret_yarp_number, FRAME_LEN};
use tracing::debug;

#[derive(Default)]
pub struct ShmemCarrier;

impl ShmemCarrier {
    pub fn new() -> Self {
        Self
    }
}

impl Carrier for ShmemCarrier {
    fn create(&self) -> Box<dyn Carrier> {
        Box::new(Self)
    }

    fn name(&self) -> &str {
        "shmem"
    }

    fn check_header(&self, header: &[u8]) -> bool {
        interpret_yarp_number(header) == specifier(CODE_SHMEM, true)
    }

    fn header(&self) -> [u8; FRAME_LEN] {
        create_yarp_number(specifier(CODE_SHMEM, true))
    }

    fn capabilities(&self) -> CarrierCapabilities {
        CarrierCapabilities {
            can_accept: true,
            can_offer: true,
            require_ack: true,
            support_reply: true,
            is_local: true,
            is_push: true,
            ..Default::default()
        }
    }

    fn respond_to_header(&mut self, state: &mut ConnectionState) -> Result<()> {
        let port = state
            .data_port()
            .unwrap_or_else(|| state.local_address().port().max(0));
        state.write_yarp_number(port)?;
        state.flush()
    }

    fn expect_reply_to_header(&mut self, state: &mut ConnectionState) -> Result<()> {
        let port = state.read_yarp_number()?;
        debug!(port, "shared memory segment port negotiated");
        state.set_remote_data_port(Some(port));
        Ok(())
    }
}
