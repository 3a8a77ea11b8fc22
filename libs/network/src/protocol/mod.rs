//! Connection Protocol Engine
//!
//! ## Purpose
//!
//! Drives one logical connection over one stream: carrier selection,
//! handshake, per-message index/payload/ack choreography, replies, and
//! teardown. Everything transport-specific is delegated to a
//! [`Carrier`]; the engine only enforces ordering.
//!
//! ## State Machine
//!
//! ```text
//! Uninitialized ─open──► CarrierSelected ─header──► HandshakeHeader
//!                                                        │
//!        ┌──────────────── reply to header ◄─────────────┘
//!        ▼
//!  HandshakeReply ──► IndexPhase ◄──── end_read / write done ────┐
//!                         │                                      │
//!                         └── begin_read / write ──► Streaming ──┘
//!
//!  any state ──close──► Closed
//! ```
//!
//! All transitions are explicit calls from the owning thread. A protocol
//! is `Send` so it can move to a worker, but it is never shared.
//!
//! ## Failure Model
//!
//! A hook failure ends the current connection attempt and is returned as-is;
//! nothing here retries. Cleanup paths (`interrupt`, `close`) swallow and log
//! their own failures.

mod reader;

pub use reader::StreamConnectionReader;

use crate::carriers::{Carrier, CarrierCapabilities, CarrierRegistry, ConnectionState};
use crate::stream::TwoWayStream;
use crate::{Result, TransportError};
use codec::{BufferedWriter, ConnectionReader, PortReader, FRAME_LEN};
use reader::ReadSession;
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::{Contact, Route};

/// Carrier pinned by `open("")`
pub const BOOTSTRAP_CARRIER: &str = "text";

/// Carrier used when a route does not name one
pub const DEFAULT_CARRIER: &str = "tcp";

/// Largest payload an index may announce before the connection is refused
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Uninitialized,
    CarrierSelected,
    HandshakeHeader,
    HandshakeReply,
    IndexPhase,
    Streaming,
    Closed,
}

pub struct Protocol {
    state: ConnectionState,
    delegate: Option<Box<dyn Carrier>>,
    recv_modifier: Option<Box<dyn Carrier>>,
    send_modifier: Option<Box<dyn Carrier>>,
    registry: Arc<CarrierRegistry>,
    session: ReadSession,
    alt_reader: Option<Box<dyn ConnectionReader + Send>>,
    phase: ProtocolState,
    max_message_len: usize,
    pending_ack: bool,
    interrupted: bool,
}

impl Protocol {
    pub fn new(stream: Box<dyn TwoWayStream>, registry: Arc<CarrierRegistry>) -> Self {
        Self {
            state: ConnectionState::new(stream),
            delegate: None,
            recv_modifier: None,
            send_modifier: None,
            registry,
            session: ReadSession::new(),
            alt_reader: None,
            phase: ProtocolState::Uninitialized,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            pending_ack: false,
            interrupted: false,
        }
    }

    /// Size the reply writer's block pool
    pub fn with_reply_pool(mut self, initial: usize, max: usize) -> Self {
        self.session = ReadSession::with_pool_sizes(initial, max);
        self
    }

    pub fn with_max_message_len(mut self, max: usize) -> Self {
        self.max_message_len = max;
        self
    }

    pub fn phase(&self) -> ProtocolState {
        self.phase
    }

    pub fn route(&self) -> &Route {
        self.state.route()
    }

    pub fn carrier_name(&self) -> Option<&str> {
        self.delegate.as_ref().map(|d| d.name())
    }

    pub fn capabilities(&self) -> Option<CarrierCapabilities> {
        self.delegate.as_ref().map(|d| d.capabilities())
    }

    pub fn is_ok(&self) -> bool {
        self.phase != ProtocolState::Closed && self.state.is_ok()
    }

    pub fn is_active(&self) -> bool {
        self.delegate.as_ref().map(|d| d.is_active()).unwrap_or(false)
    }

    pub fn remote_address(&self) -> Contact {
        self.state.remote_address()
    }

    /// Connection state for hosting code that negotiates data ports
    pub fn connection_state_mut(&mut self) -> &mut ConnectionState {
        &mut self.state
    }

    /// Pin a carrier by name before `open`
    pub fn set_carrier(&mut self, name: &str) -> Result<()> {
        let carrier = self.carrier_by_name(name)?;
        let route = self.state.route().clone().with_carrier(carrier.name());
        self.state.set_route(route);
        self.delegate = Some(carrier);
        Ok(())
    }

    /// Install a carrier that rewrites every incoming payload
    pub fn set_receive_modifier(&mut self, modifier: Box<dyn Carrier>) -> Result<()> {
        if !modifier.modifies_incoming_data() {
            return Err(TransportError::configuration(
                format!("carrier '{}' does not modify incoming data", modifier.name()),
                Some("receive_modifier"),
            ));
        }
        self.recv_modifier = Some(modifier);
        Ok(())
    }

    /// Install a carrier that rewrites every outgoing payload
    pub fn set_send_modifier(&mut self, modifier: Box<dyn Carrier>) -> Result<()> {
        if !modifier.modifies_outgoing_data() {
            return Err(TransportError::configuration(
                format!("carrier '{}' does not modify outgoing data", modifier.name()),
                Some("send_modifier"),
            ));
        }
        self.send_modifier = Some(modifier);
        Ok(())
    }

    /// Replace the default reader for the next message
    pub fn set_reader(&mut self, reader: Box<dyn ConnectionReader + Send>) {
        self.alt_reader = Some(reader);
    }

    /// Open as the initiating side of `route`
    pub fn open_route(&mut self, route: Route) -> Result<()> {
        self.expect_phase(ProtocolState::Uninitialized, "open")?;
        let name = if route.carrier_name().is_empty() {
            DEFAULT_CARRIER.to_string()
        } else {
            route.carrier_name().to_string()
        };
        let carrier = self.carrier_by_name(&name)?;
        self.state.set_route(route.with_carrier(carrier.name()));
        self.delegate = Some(carrier);
        self.phase = ProtocolState::CarrierSelected;
        debug!(route = %self.state.route(), "opening connection");

        let result = self.initiate();
        self.settle_open(result)
    }

    /// Open as the accepting side; `name` becomes the route's destination
    pub fn open(&mut self, name: &str) -> Result<()> {
        self.expect_phase(ProtocolState::Uninitialized, "open")?;
        if name.is_empty() {
            self.set_carrier(BOOTSTRAP_CARRIER)?;
        }
        let result = self.accept(name);
        self.settle_open(result)
    }

    fn initiate(&mut self) -> Result<()> {
        let delegate = self
            .delegate
            .as_mut()
            .ok_or_else(TransportError::no_connection)?;
        delegate.prepare_send(&mut self.state)?;
        delegate.send_header(&mut self.state)?;
        self.phase = ProtocolState::HandshakeHeader;
        delegate.expect_reply_to_header(&mut self.state)?;
        self.phase = ProtocolState::HandshakeReply;
        Ok(())
    }

    fn accept(&mut self, name: &str) -> Result<()> {
        let mut header = [0u8; FRAME_LEN];
        self.state.read_exact(&mut header)?;

        let pinned_matches = self
            .delegate
            .as_ref()
            .map(|d| d.check_header(&header))
            .unwrap_or(false);
        if !pinned_matches {
            match self.registry.choose_by_header(&header) {
                Some(carrier) => self.delegate = Some(carrier),
                None => {
                    self.send_unrecognized_banner(&header);
                    return Err(TransportError::unrecognized_protocol(&header));
                }
            }
        }
        self.phase = ProtocolState::CarrierSelected;

        let delegate = self
            .delegate
            .as_mut()
            .ok_or_else(TransportError::no_connection)?;
        delegate.set_parameters(&header);
        let route = self.state.route().clone().with_carrier(delegate.name());
        self.state.set_route(route);

        delegate.expect_sender_specifier(&mut self.state)?;
        delegate.expect_extra_header(&mut self.state)?;
        self.phase = ProtocolState::HandshakeHeader;
        delegate.respond_to_header(&mut self.state)?;
        self.phase = ProtocolState::HandshakeReply;

        if !name.is_empty() {
            let route = self.state.route().clone().with_to(name);
            self.state.set_route(route);
        }
        debug!(route = %self.state.route(), "connection accepted");
        Ok(())
    }

    fn settle_open(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.phase = ProtocolState::IndexPhase;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, category = e.category(), "connection attempt failed");
                self.close();
                Err(e)
            }
        }
    }

    /// Send one message; returns true when a reply was read into the writer's handler
    pub fn write(&mut self, writer: &mut BufferedWriter<'_>) -> Result<bool> {
        let delegate = self
            .delegate
            .as_mut()
            .ok_or_else(TransportError::no_connection)?;
        if !delegate.is_active() {
            return Ok(false);
        }
        if self.phase != ProtocolState::IndexPhase {
            return Err(TransportError::transport(format!(
                "cannot write in state {:?}",
                self.phase
            )));
        }
        let caps = delegate.capabilities();
        if caps.is_text_mode {
            writer.convert_text_mode();
        }
        writer.stop_write();

        let handler = writer.take_reply_handler();
        self.state.set_reply_expected(handler.is_some());
        self.phase = ProtocolState::Streaming;

        self.state.stream_mut()?.begin_packet();
        let sent = match self.send_modifier.as_mut() {
            Some(modifier) => {
                let payload = modifier.modify_outgoing_data(writer.to_bytes());
                let mut modified = BufferedWriter::new();
                modified.reset(writer.is_text_mode());
                modified.append_block_copy(&payload);
                delegate.write(&mut self.state, &mut modified)
            }
            None => delegate.write(&mut self.state, writer),
        };
        self.state.stream_mut()?.end_packet();
        sent?;

        let mut replied = false;
        if let Some(handler) = handler {
            if !caps.support_reply {
                info!(
                    route = %self.state.route(),
                    "connection does not support replies (try \"tcp\" or \"text_ack\")"
                );
            } else {
                delegate.expect_reply(&mut self.state)?;
                self.session
                    .begin(self.state.message_len(), caps.is_text_mode);
                let mut reader = StreamConnectionReader::new(&mut self.state, &mut self.session);
                handler.read(&mut reader)?;
                self.session.drain(&mut self.state)?;
                replied = true;
            }
        }

        if caps.require_ack {
            delegate.expect_ack(&mut self.state)?;
        }
        self.state.set_reply_expected(false);
        self.phase = ProtocolState::IndexPhase;
        Ok(replied)
    }

    /// Wait for the next message; false means a modifier dropped it (already acknowledged)
    pub fn begin_read(&mut self) -> Result<bool> {
        if self.phase != ProtocolState::IndexPhase {
            return Err(TransportError::transport(format!(
                "cannot read in state {:?}",
                self.phase
            )));
        }
        let delegate = self
            .delegate
            .as_mut()
            .ok_or_else(TransportError::no_connection)?;
        // owed from here on, even if the index never arrives
        self.pending_ack = true;
        self.state.stream_mut()?.begin_packet();
        delegate.expect_index(&mut self.state)?;
        delegate.respond_to_index(&mut self.state)?;
        let text_mode = delegate.capabilities().is_text_mode;

        let len = self.state.message_len();
        if let Some(len) = len {
            if len > self.max_message_len {
                return Err(TransportError::protocol(format!(
                    "message of {} bytes exceeds limit of {}",
                    len, self.max_message_len
                )));
            }
        }
        self.phase = ProtocolState::Streaming;

        let Some(modifier) = self.recv_modifier.as_mut() else {
            self.session.begin(len, text_mode);
            return Ok(true);
        };
        let len = len.ok_or_else(|| {
            TransportError::configuration(
                "receive modifiers need a carrier that frames messages",
                Some("receive_modifier"),
            )
        })?;
        let mut payload = vec![0u8; len];
        self.state.read_exact(&mut payload)?;
        let payload = modifier.modify_incoming_data(payload);
        if !modifier.accept_incoming_data(&payload) {
            debug!(route = %self.state.route(), bytes = len, "incoming message rejected by modifier");
            self.session.begin(Some(0), text_mode);
            self.state.set_reply_expected(false);
            self.finish_read(true)?;
            return Ok(false);
        }
        self.session.begin_buffered(payload, text_mode);
        Ok(true)
    }

    /// Run `f` against the reader for the current message
    pub fn with_reader<R>(&mut self, f: impl FnOnce(&mut dyn ConnectionReader) -> R) -> Result<R> {
        if self.phase != ProtocolState::Streaming {
            return Err(TransportError::transport("no message in progress"));
        }
        if let Some(alt) = self.alt_reader.as_mut() {
            return Ok(f(alt.as_mut()));
        }
        let mut reader = StreamConnectionReader::new(&mut self.state, &mut self.session);
        Ok(f(&mut reader))
    }

    /// Load the current message into `target`
    pub fn read(&mut self, target: &mut dyn PortReader) -> Result<()> {
        self.with_reader(|reader| target.read(reader))?
            .map_err(TransportError::from)
    }

    /// Writer for the reply to the current message, flushed by `end_read`
    pub fn reply_writer(&mut self) -> &mut BufferedWriter<'static> {
        &mut self.session.reply
    }

    /// Finish the current message: flush any reply, then acknowledge
    pub fn end_read(&mut self) -> Result<()> {
        if self.phase != ProtocolState::Streaming {
            return Ok(());
        }
        let alternate = self.alt_reader.take().is_some();
        self.finish_read(alternate)
    }

    fn finish_read(&mut self, skip_reply: bool) -> Result<()> {
        if !skip_reply {
            self.session.drain(&mut self.state)?;
            self.flush_reply()?;
        }
        self.send_pending_ack()?;
        self.phase = ProtocolState::IndexPhase;
        Ok(())
    }

    fn flush_reply(&mut self) -> Result<()> {
        let delegate = self
            .delegate
            .as_mut()
            .ok_or_else(TransportError::no_connection)?;
        let caps = delegate.capabilities();
        let has_reply = !self.session.reply.is_empty();
        if caps.is_text_mode {
            if !has_reply {
                return Ok(());
            }
        } else if !self.state.reply_expected() {
            // sender has no reply handler and reads only its ack
            if has_reply {
                debug!(
                    route = %self.state.route(),
                    "dropping reply to a message that did not ask for one"
                );
                self.session.reply.restart();
            }
            return Ok(());
        }
        if !caps.support_reply && !caps.is_text_mode {
            info!(
                route = %self.state.route(),
                "connection does not support replies (try \"tcp\" or \"text_ack\")"
            );
            return Ok(());
        }
        if caps.is_text_mode {
            self.session.reply.convert_text_mode();
        }
        self.session.reply.stop_write();
        delegate.reply(&mut self.state, &mut self.session.reply)?;
        self.session.reply.restart();
        Ok(())
    }

    fn send_pending_ack(&mut self) -> Result<()> {
        if !self.pending_ack {
            return Ok(());
        }
        self.pending_ack = false;
        let delegate = self
            .delegate
            .as_mut()
            .ok_or_else(TransportError::no_connection)?;
        if delegate.capabilities().require_ack {
            delegate.send_ack(&mut self.state)?;
        }
        Ok(())
    }

    /// Best-effort ack, then abort the stream; safe to call repeatedly
    pub fn interrupt(&mut self) {
        if self.interrupted || self.phase == ProtocolState::Closed {
            return;
        }
        self.interrupted = true;
        if let Err(e) = self.send_pending_ack() {
            debug!(error = %e, "ack during interrupt failed");
        }
        if let Ok(stream) = self.state.stream_mut() {
            stream.interrupt();
        }
    }

    /// Best-effort ack, then release carrier and stream; safe to call repeatedly
    pub fn close(&mut self) {
        if self.phase == ProtocolState::Closed {
            return;
        }
        if !self.interrupted {
            if let Err(e) = self.send_pending_ack() {
                debug!(error = %e, "ack during close failed");
            }
        }
        self.pending_ack = false;
        for carrier in [
            self.delegate.take(),
            self.recv_modifier.take(),
            self.send_modifier.take(),
        ]
        .into_iter()
        .flatten()
        {
            let mut carrier = carrier;
            carrier.close();
        }
        if let Some(mut stream) = self.state.take_stream() {
            stream.close();
        }
        self.alt_reader = None;
        self.phase = ProtocolState::Closed;
        debug!(route = %self.state.route(), "connection closed");
    }

    /// Detach the stream, e.g. to move the data path elsewhere
    pub fn take_stream(&mut self) -> Option<Box<dyn TwoWayStream>> {
        self.state.take_stream()
    }

    pub fn give_stream(&mut self, stream: Box<dyn TwoWayStream>) {
        self.state.give_stream(stream);
    }

    fn expect_phase(&self, expected: ProtocolState, operation: &str) -> Result<()> {
        if self.phase != expected {
            return Err(TransportError::transport(format!(
                "cannot {} in state {:?}",
                operation, self.phase
            )));
        }
        Ok(())
    }

    fn carrier_by_name(&self, name: &str) -> Result<Box<dyn Carrier>> {
        let carrier = self.registry.choose_by_name(name).ok_or_else(|| {
            TransportError::configuration(format!("unknown carrier '{}'", name), Some("carrier"))
        })?;
        if carrier.modifies_incoming_data() {
            return Err(TransportError::configuration(
                format!("carrier '{}' is a modifier and cannot carry a connection", name),
                Some("carrier"),
            ));
        }
        Ok(carrier)
    }

    fn send_unrecognized_banner(&mut self, header: &[u8]) {
        let shown: Vec<String> = header.iter().map(|b| b.to_string()).collect();
        let banner = format!(
            "* Error. Protocol not found.\r\n\
             * Hello. You appear to be trying to communicate with a port.\r\n\
             * The first 8 bytes sent to a port select the carrier to speak.\r\n\
             * The first 8 bytes you sent were: [{}] \"{}\"\r\n\
             * To talk by hand, send \"CONNECT yourname\" and a newline.\r\n",
            shown.join(" "),
            String::from_utf8_lossy(header).escape_debug()
        );
        if let Err(e) = self
            .state
            .write_all(banner.as_bytes())
            .and_then(|_| self.state.flush())
        {
            debug!(error = %e, "could not explain protocol mismatch to peer");
        }
    }
}

impl Drop for Protocol {
    fn drop(&mut self) {
        self.close();
    }
}
