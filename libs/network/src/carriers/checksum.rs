//! CRC32 integrity modifier
//!
//! Not a transport: it is installed on a protocol as a send or receive
//! modifier. Outgoing payloads gain a 4-byte big-endian CRC32 trailer;
//! incoming payloads are verified and stripped, and a mismatch makes
//! `accept_incoming_data` drop the message.

use super::{Carrier, CarrierCapabilities};
use codec::FRAME_LEN;
use tracing::warn;

const TRAILER_LEN: usize = 4;

pub struct ChecksumCarrier {
    last_valid: bool,
}

impl ChecksumCarrier {
    pub fn new() -> Self {
        Self { last_valid: true }
    }
}

impl Default for ChecksumCarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Carrier for ChecksumCarrier {
    fn create(&self) -> Box<dyn Carrier> {
        Box::new(Self::new())
    }

    fn name(&self) -> &str {
        "crc"
    }

    /// Never selected by header
    fn check_header(&self, _header: &[u8]) -> bool {
        false
    }

    fn header(&self) -> [u8; FRAME_LEN] {
        *b"CRC32MOD"
    }

    fn capabilities(&self) -> CarrierCapabilities {
        CarrierCapabilities::default()
    }

    fn modifies_incoming_data(&self) -> bool {
        true
    }

    fn modify_incoming_data(&mut self, mut data: Vec<u8>) -> Vec<u8> {
        if data.len() < TRAILER_LEN {
            self.last_valid = false;
            return data;
        }
        let split = data.len() - TRAILER_LEN;
        let mut trailer = [0u8; TRAILER_LEN];
        trailer.copy_from_slice(&data[split..]);
        data.truncate(split);
        let expected = u32::from_be_bytes(trailer);
        let actual = crc32fast::hash(&data);
        self.last_valid = expected == actual;
        if !self.last_valid {
            warn!(expected, actual, bytes = data.len(), "checksum mismatch, dropping message");
        }
        data
    }

    fn accept_incoming_data(&mut self, _data: &[u8]) -> bool {
        self.last_valid
    }

    fn modifies_outgoing_data(&self) -> bool {
        true
    }

    fn modify_outgoing_data(&mut self, mut data: Vec<u8>) -> Vec<u8> {
        let crc = crc32fast::hash(&data);
        data.extend_from_slice(&crc.to_be_bytes());
        data
    }
}
