//! Connectionless carriers: `udp` and `mcast`
//!
//! The handshake runs over the connection stream; the acceptor answers the
//! header with an integer frame naming the port it will take datagrams on.
//! Moving the data path onto a datagram socket is the hosting layer's job
//! (see [`Protocol::take_stream`](crate::Protocol::take_stream)); until it
//! does, messages keep flowing on the handshake stream without acks.

use super::tcp::{specifier, CODE_MCAST, CODE_UDP};
use super::{Carrier, CarrierCapabilities, ConnectOutcome, ConnectionState, ContactStyle};
use crate::Result;
use codec::{create_yarp_number, interpret_yarp_number, FRAME_LEN};
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};
use types::Contact;

fn respond_with_port(state: &mut ConnectionState) -> Result<()> {
    let port = state
        .data_port()
        .unwrap_or_else(|| state.local_address().port().max(0));
    state.write_yarp_number(port)?;
    state.flush()
}

fn expect_port(state: &mut ConnectionState) -> Result<()> {
    let port = state.read_yarp_number()?;
    debug!(port, route = %state.route(), "peer announced data port");
    state.set_remote_data_port(Some(port));
    Ok(())
}

#[derive(Default)]
pub struct UdpCarrier;

impl UdpCarrier {
    pub fn new() -> Self {
        Self
    }
}

impl Carrier for UdpCarrier {
    fn create(&self) -> Box<dyn Carrier> {
        Box::new(Self)
    }

    fn name(&self) -> &str {
        "udp"
    }

    fn check_header(&self, header: &[u8]) -> bool {
        interpret_yarp_number(header) == specifier(CODE_UDP, false)
    }

    fn header(&self) -> [u8; FRAME_LEN] {
        create_yarp_number(specifier(CODE_UDP, false))
    }

    fn capabilities(&self) -> CarrierCapabilities {
        CarrierCapabilities {
            is_connectionless: true,
            can_accept: true,
            can_offer: true,
            is_push: true,
            ..Default::default()
        }
    }

    fn expect_reply_to_header(&mut self, state: &mut ConnectionState) -> Result<()> {
        expect_port(state)
    }

    fn respond_to_header(&mut self, state: &mut ConnectionState) -> Result<()> {
        respond_with_port(state)
    }

    fn send_ack(&mut self, _state: &mut ConnectionState) -> Result<()> {
        Ok(())
    }

    fn expect_ack(&mut self, _state: &mut ConnectionState) -> Result<()> {
        Ok(())
    }
}

/// Multicast carrier
///
/// Several logical connections can share one group; only the one marked
/// active performs writes.
pub struct McastCarrier {
    group: Option<Contact>,
    active: bool,
}

impl McastCarrier {
    pub fn new() -> Self {
        Self {
            group: None,
            active: true,
        }
    }

    /// Mark this logical connection as a passive member of its group
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn group(&self) -> Option<&Contact> {
        self.group.as_ref()
    }
}

impl Default for McastCarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Carrier for McastCarrier {
    fn create(&self) -> Box<dyn Carrier> {
        Box::new(Self::new())
    }

    fn name(&self) -> &str {
        "mcast"
    }

    fn check_header(&self, header: &[u8]) -> bool {
        interpret_yarp_number(header) == specifier(CODE_MCAST, false)
    }

    fn header(&self) -> [u8; FRAME_LEN] {
        create_yarp_number(specifier(CODE_MCAST, false))
    }

    fn capabilities(&self) -> CarrierCapabilities {
        CarrierCapabilities {
            is_connectionless: true,
            is_broadcast: true,
            can_accept: true,
            can_offer: true,
            is_push: true,
            ..Default::default()
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn expect_reply_to_header(&mut self, state: &mut ConnectionState) -> Result<()> {
        expect_port(state)
    }

    fn respond_to_header(&mut self, state: &mut ConnectionState) -> Result<()> {
        respond_with_port(state)
    }

    fn send_ack(&mut self, _state: &mut ConnectionState) -> Result<()> {
        Ok(())
    }

    fn expect_ack(&mut self, _state: &mut ConnectionState) -> Result<()> {
        Ok(())
    }

    /// Join the group named by `dest`; its host must be a multicast address
    fn connect(
        &mut self,
        src: &Contact,
        dest: &Contact,
        style: &ContactStyle,
        _mode: i32,
        reversed: bool,
    ) -> ConnectOutcome {
        match dest.host().parse::<Ipv4Addr>() {
            Ok(ip) if ip.is_multicast() && dest.is_valid() => {
                if !style.quiet {
                    info!(src = src.name(), group = %dest.socket_address(), reversed, "joined multicast group");
                }
                self.group = Some(dest.clone());
                ConnectOutcome::Connected
            }
            _ => {
                warn!(dest = %dest, "not a multicast group");
                ConnectOutcome::Failed
            }
        }
    }

    fn close(&mut self) {
        self.group = None;
    }
}
