//! Per-connection request loop
//!
//! Each accepted socket gets one synchronous [`Protocol`] acceptor. Text
//! carriers carry one command line per message and get a text reply;
//! binary carriers carry a [`Bottle`] and get a bottle back.
//!
//! ```text
//! socket ─► Protocol::open("") ─► begin_read ─► line / bottle
//!                                                   │
//!                              NameService::apply / apply_bottle
//!                                                   │
//!                      end_read (reply, ack) ◄─ reply_writer
//! ```

use codec::{Bottle, PortWriter};
use mw_config::ProtocolSettings;
use naming::{NameService, COMMAND_PREFIX, END_OF_MESSAGE};
use network::{CarrierRegistry, Protocol, Result, SocketStream};
use std::sync::Arc;
use tracing::{debug, trace};
use types::Contact;

/// Serve requests on one connection until the peer goes away
pub fn handle_connection(
    stream: SocketStream,
    service: &NameService,
    registry: Arc<CarrierRegistry>,
    settings: &ProtocolSettings,
) -> Result<()> {
    let mut protocol = Protocol::new(Box::new(stream), registry)
        .with_reply_pool(settings.initial_pool_size, settings.max_pool_block)
        .with_max_message_len(settings.max_message_size);
    protocol.open("")?;

    let remote = protocol.remote_address();
    let text_mode = protocol
        .capabilities()
        .map(|caps| caps.is_text_mode)
        .unwrap_or(true);
    debug!(
        route = %protocol.route(),
        carrier = protocol.carrier_name().unwrap_or("?"),
        "name server connection opened"
    );

    let mut served = 0usize;
    loop {
        match protocol.begin_read() {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                debug!(error = %e, category = e.category(), "connection ended");
                break;
            }
        }

        if text_mode {
            // text carriers have no framing; a closed peer shows up here
            let line = match protocol.with_reader(|reader| reader.expect_line())? {
                Ok(line) => line,
                Err(e) => {
                    debug!(error = %e, "text connection ended");
                    break;
                }
            };
            serve_line(&mut protocol, service, &remote, &line);
        } else {
            serve_bottle(&mut protocol, service, &remote)?;
        }
        protocol.end_read()?;
        served += 1;
    }

    debug!(requests = served, "name server connection closed");
    protocol.close();
    Ok(())
}

fn serve_line(protocol: &mut Protocol, service: &NameService, remote: &Contact, line: &str) {
    let reply = service.apply(&with_prefix(line), remote);
    trace!(request = %line.trim(), reply = %reply, "text request");
    protocol
        .reply_writer()
        .append_block_copy(line_reply(&reply).as_bytes());
}

fn serve_bottle(protocol: &mut Protocol, service: &NameService, remote: &Contact) -> Result<()> {
    let mut request = Bottle::new();
    protocol.read(&mut request)?;
    let reply = service.apply_bottle(&request, remote);
    trace!(request = %request, reply = %reply, "structured request");
    reply.write(protocol.reply_writer())?;
    Ok(())
}

/// Commands may arrive with or without the leading `NAME_SERVER` token
fn with_prefix(line: &str) -> String {
    let line = line.trim();
    if line.split_whitespace().next() == Some(COMMAND_PREFIX) {
        line.to_string()
    } else {
        format!("{} {}", COMMAND_PREFIX, line)
    }
}

/// Reply text as CRLF lines, always closed by the end-of-message line
fn line_reply(reply: &str) -> String {
    let mut text = reply.replace('\n', "\r\n");
    if !reply.ends_with(END_OF_MESSAGE) {
        if !text.is_empty() {
            text.push_str("\r\n");
        }
        text.push_str(END_OF_MESSAGE);
    }
    text.push_str("\r\n");
    text
}
