//! Binary framing shared by stream carriers
//!
//! ```text
//! sender specifier : [frame(len)] [name bytes .. NUL]
//! index            : [frame(10)] [1, reply, 0xFF x 8] [payload len : u32 BE]
//! ack              : [frame(n)] followed by n bytes the receiver discards
//! ```

use super::ConnectionState;
use crate::{Result, TransportError};
use codec::BufferedWriter;
use tracing::{debug, warn};

/// Index preamble length announced in the index frame
pub const INDEX_LEN: i32 = 10;

/// Sender names past this length are truncated
pub const MAX_SENDER_NAME: usize = 1000;

/// Sender specifiers claiming more than this are rejected outright
const MAX_SPECIFIER_BYTES: i32 = 65_536;

pub fn send_sender_specifier(state: &mut ConnectionState) -> Result<()> {
    let mut name = state.route().from_name().as_bytes().to_vec();
    name.push(0);
    state.write_yarp_number(name.len() as i32)?;
    state.write_all(&name)
}

pub fn expect_sender_specifier(state: &mut ConnectionState) -> Result<()> {
    let len = state.read_yarp_number()?;
    if len > MAX_SPECIFIER_BYTES {
        return Err(TransportError::protocol(format!(
            "sender name of {} bytes is not plausible",
            len
        )));
    }
    let mut name = vec![0u8; len as usize];
    state.read_exact(&mut name)?;
    while name.last() == Some(&0) {
        name.pop();
    }
    if name.len() > MAX_SENDER_NAME {
        warn!(len = name.len(), "sender name truncated");
        name.truncate(MAX_SENDER_NAME);
    }
    let from = String::from_utf8_lossy(&name).into_owned();
    debug!(from = %from, "sender specifier received");
    let route = state.route().clone().with_from(from);
    state.set_route(route);
    Ok(())
}

pub fn send_index(state: &mut ConnectionState, payload_len: usize) -> Result<()> {
    let reply = u8::from(state.reply_expected());
    let mut index = [0xFFu8; INDEX_LEN as usize];
    index[0] = 1;
    index[1] = reply;
    state.write_yarp_number(INDEX_LEN)?;
    state.write_all(&index)?;
    state.write_all(&(payload_len as u32).to_be_bytes())
}

pub fn expect_index(state: &mut ConnectionState) -> Result<()> {
    let len = state.read_yarp_number()?;
    if len != INDEX_LEN {
        return Err(TransportError::protocol(format!(
            "bad index header length {}",
            len
        )));
    }
    let mut index = [0u8; INDEX_LEN as usize];
    state.read_exact(&mut index)?;
    let mut payload = [0u8; 4];
    state.read_exact(&mut payload)?;
    state.set_reply_expected(index[1] != 0);
    state.set_message_len(Some(u32::from_be_bytes(payload) as usize));
    Ok(())
}

pub fn write_payload(state: &mut ConnectionState, writer: &mut BufferedWriter<'_>) -> Result<()> {
    let stream = state.stream_mut()?;
    writer
        .write_to(stream)
        .map_err(|e| TransportError::transport_with_source("stream died", e))
}

pub fn send_ack(state: &mut ConnectionState) -> Result<()> {
    state.write_yarp_number(0)?;
    state.flush()
}

pub fn expect_ack(state: &mut ConnectionState) -> Result<()> {
    let extra = state.read_yarp_number()?;
    state.discard(extra as usize)
}
