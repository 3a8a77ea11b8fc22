//! TCP carrier
//!
//! Plain binary framing over the connection stream. The header is the
//! integer frame `7777 + 3`, plus `128` when every message is acknowledged:
//! `tcp` acknowledges, `fast_tcp` does not.

use super::{Carrier, CarrierCapabilities};
use codec::{create_yarp_number, interpret_yarp_number, FRAME_LEN};

/// Base of the binary carrier header numbering
pub const SPECIFIER_BASE: i32 = 7777;

/// Added to the header number when the carrier requires acknowledgements
pub const ACK_FLAG: i32 = 128;

pub const CODE_UDP: i32 = 0;
pub const CODE_MCAST: i32 = 1;
pub const CODE_SHMEM: i32 = 2;
pub const CODE_TCP: i32 = 3;

/// Header number for a binary carrier code
pub fn specifier(code: i32, require_ack: bool) -> i32 {
    SPECIFIER_BASE + code + if require_ack { ACK_FLAG } else { 0 }
}

pub struct TcpCarrier {
    require_ack: bool,
}

impl TcpCarrier {
    /// Acknowledged variant, registered as `tcp`
    pub fn new() -> Self {
        Self { require_ack: true }
    }

    /// Unacknowledged variant, registered as `fast_tcp`
    pub fn fast() -> Self {
        Self { require_ack: false }
    }
}

impl Default for TcpCarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Carrier for TcpCarrier {
    fn create(&self) -> Box<dyn Carrier> {
        Box::new(Self {
            require_ack: self.require_ack,
        })
    }

    fn name(&self) -> &str {
        if self.require_ack {
            "tcp"
        } else {
            "fast_tcp"
        }
    }

    fn check_header(&self, header: &[u8]) -> bool {
        interpret_yarp_number(header) == specifier(CODE_TCP, self.require_ack)
    }

    fn header(&self) -> [u8; FRAME_LEN] {
        create_yarp_number(specifier(CODE_TCP, self.require_ack))
    }

    fn capabilities(&self) -> CarrierCapabilities {
        CarrierCapabilities {
            can_accept: true,
            can_offer: true,
            can_escape: true,
            require_ack: self.require_ack,
            support_reply: true,
            is_push: true,
            ..Default::default()
        }
    }
}
