//! Name-server client and route bootstrap
//!
//! A port finds its peers by asking the name server. [`NameClient`] speaks
//! the text command protocol over a short-lived `text_ack` connection;
//! [`connect_route`] resolves a route's destination through any
//! [`NameResolver`] and opens an initiating [`Protocol`] to it.

use crate::carriers::CarrierRegistry;
use crate::protocol::{Protocol, DEFAULT_CARRIER};
use crate::stream::SocketStream;
use crate::{Result, TransportError};
use codec::{BufferedWriter, ConnectionReader, PortReader};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use types::{is_wildcard, Contact, Route, COMMAND_PREFIX, END_OF_MESSAGE};

/// Carrier used to talk to the name server
pub const NAME_CLIENT_CARRIER: &str = "text_ack";

/// Maps a port name to the contact it is reachable at
pub trait NameResolver {
    fn resolve(&self, name: &str) -> Result<Contact>;
}

impl<F> NameResolver for F
where
    F: Fn(&str) -> Option<Contact>,
{
    fn resolve(&self, name: &str) -> Result<Contact> {
        self(name)
            .filter(Contact::is_valid)
            .ok_or_else(|| TransportError::registry(format!("port '{}' not known", name)))
    }
}

/// Collects text reply lines up to the end-of-message marker
#[derive(Debug, Default)]
struct ReplyLines {
    lines: Vec<String>,
}

impl PortReader for ReplyLines {
    fn read(&mut self, reader: &mut dyn ConnectionReader) -> codec::Result<()> {
        loop {
            let line = reader.expect_line()?;
            if let Some(pos) = line.find(END_OF_MESSAGE) {
                let head = &line[..pos];
                if !head.is_empty() {
                    self.lines.push(head.to_string());
                }
                return Ok(());
            }
            self.lines.push(line);
        }
    }
}

pub struct NameClient {
    server: Contact,
    registry: Arc<CarrierRegistry>,
    client_name: String,
    timeout: Option<Duration>,
}

impl NameClient {
    pub fn new(server: Contact) -> Self {
        Self {
            server,
            registry: Arc::new(CarrierRegistry::with_defaults()),
            client_name: "anonymous".to_string(),
            timeout: Some(Duration::from_secs(5)),
        }
    }

    pub fn with_registry(mut self, registry: Arc<CarrierRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Name announced as the sender of each command
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn server(&self) -> &Contact {
        &self.server
    }

    /// Send one command; returns the reply lines without the end marker
    pub fn send(&self, command: &str) -> Result<Vec<String>> {
        let stream = SocketStream::connect_timeout(&self.server, self.timeout)?;
        let mut protocol = Protocol::new(Box::new(stream), self.registry.clone());
        protocol.open_route(Route::new(
            self.client_name.as_str(),
            self.server.name(),
            NAME_CLIENT_CARRIER,
        ))?;

        let mut reply = ReplyLines::default();
        let line = format!("{} {}\n", COMMAND_PREFIX, command.trim());
        let replied = {
            let mut writer = BufferedWriter::new();
            writer.reset(true);
            writer.append_block(line.as_bytes());
            writer.set_reply_handler(&mut reply);
            protocol.write(&mut writer)?
        };
        protocol.close();
        if !replied {
            return Err(TransportError::transport("name server did not reply"));
        }
        debug!(command = %command.trim(), lines = reply.lines.len(), "name server replied");
        Ok(reply.lines)
    }

    pub fn query(&self, name: &str) -> Result<Contact> {
        let lines = self.send(&format!("query {}", name))?;
        first_registration(&lines)
    }

    /// Register `contact`; unset fields (`...`, port 0) are filled by the server
    pub fn register(&self, contact: &Contact) -> Result<Contact> {
        let port = if contact.port_missing() {
            "...".to_string()
        } else {
            contact.port().to_string()
        };
        let command = format!(
            "register {} {} {} {}",
            wildcard_or(contact.name()),
            wildcard_or(contact.carrier()),
            wildcard_or(contact.host()),
            port
        );
        let lines = self.send(&command)?;
        first_registration(&lines)
    }

    /// Returns the (now empty) registration
    pub fn unregister(&self, name: &str) -> Result<Contact> {
        let lines = self.send(&format!("unregister {}", name))?;
        first_registration(&lines)
    }
}

fn wildcard_or(field: &str) -> &str {
    if field.is_empty() || is_wildcard(field) {
        "..."
    } else {
        field
    }
}

fn first_registration(lines: &[String]) -> Result<Contact> {
    match lines.iter().find(|l| l.starts_with("registration ")) {
        Some(line) => Contact::parse_registration_line(line)
            .map_err(|e| TransportError::registry(e.to_string())),
        None => Ok(Contact::empty()),
    }
}

/// Resolve `route`'s destination and open an initiating protocol to it
pub fn connect_route(
    route: Route,
    resolver: &dyn NameResolver,
    registry: Arc<CarrierRegistry>,
) -> Result<Protocol> {
    let contact = resolver.resolve(route.to_name())?;
    let carrier = if !route.carrier_name().is_empty() {
        route.carrier_name().to_string()
    } else if !contact.carrier().is_empty() && !contact.carrier_missing() {
        contact.carrier().to_string()
    } else {
        DEFAULT_CARRIER.to_string()
    };
    debug!(to = route.to_name(), at = %contact.socket_address(), carrier = %carrier, "connecting route");

    let stream = SocketStream::connect(&contact)?;
    let mut protocol = Protocol::new(Box::new(stream), registry);
    protocol.open_route(route.with_carrier(carrier))?;
    Ok(protocol)
}
