//! Contact addressing for named ports
//!
//! A [`Contact`] is the resolved address of a port: its registered name, the
//! host and port it listens on, and the carrier it expects connections over.
//! The name service hands these out; the bootstrap path consumes them to open
//! a stream before any carrier negotiation happens.
//!
//! ## Wildcards
//!
//! When asking the name service to register a port, any field may be left
//! for the service to fill in. An empty string or `"..."` marks a missing
//! name, host or carrier; a port of `0` marks a missing port number.

use crate::errors::AddressError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder accepted anywhere a field should be chosen by the name service
pub const WILDCARD: &str = "...";

/// Resolved address of a named port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    name: String,
    host: String,
    port: i32,
    carrier: String,
}

impl Contact {
    /// Build a fully specified contact
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: i32,
        carrier: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            carrier: carrier.into(),
        }
    }

    /// The "unknown" contact returned for names nobody registered
    pub fn empty() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            port: -1,
            carrier: String::new(),
        }
    }

    /// Contact that only carries a name, every other field left to the registry
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: WILDCARD.to_string(),
            port: 0,
            carrier: WILDCARD.to_string(),
        }
    }

    /// Contact for a raw socket address with no registered name
    pub fn by_socket(carrier: impl Into<String>, host: impl Into<String>, port: i32) -> Self {
        Self {
            name: String::new(),
            host: host.into(),
            port,
            carrier: carrier.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> i32 {
        self.port
    }

    pub fn carrier(&self) -> &str {
        &self.carrier
    }

    /// A contact is usable once it has a non-negative port number
    pub fn is_valid(&self) -> bool {
        self.port >= 0
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: i32) -> Self {
        self.port = port;
        self
    }

    pub fn with_carrier(mut self, carrier: impl Into<String>) -> Self {
        self.carrier = carrier.into();
        self
    }

    /// True when the host should be assigned by the name service
    pub fn host_missing(&self) -> bool {
        is_wildcard(&self.host)
    }

    /// True when the carrier should be assigned by the name service
    pub fn carrier_missing(&self) -> bool {
        is_wildcard(&self.carrier)
    }

    /// True when the port number should be assigned by the name service
    pub fn port_missing(&self) -> bool {
        self.port == 0
    }

    /// `host:port` form suitable for socket connection
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URI form, e.g. `tcp://127.0.0.1:10002/`
    pub fn to_uri(&self) -> String {
        format!("{}://{}:{}/", self.carrier, self.host, self.port)
    }

    /// One-line textual registration used by the name service line protocol
    ///
    /// Unknown contacts render as an empty string.
    pub fn registration_line(&self) -> String {
        if !self.is_valid() {
            return String::new();
        }
        format!(
            "registration name {} ip {} port {} type {}\n",
            self.name, self.host, self.port, self.carrier
        )
    }

    /// Parse a `registration name N ip H port P type C` line
    pub fn parse_registration_line(line: &str) -> Result<Self, AddressError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 9 || tokens[0] != "registration" {
            return Err(AddressError::MalformedRegistration {
                line: line.trim().to_string(),
            });
        }

        let mut contact = Contact::empty();
        let mut fields = tokens[1..].chunks(2);
        while let Some([key, value]) = fields.next() {
            match *key {
                "name" => contact.name = value.to_string(),
                "ip" => contact.host = value.to_string(),
                "port" => {
                    contact.port = value.parse().map_err(|_| AddressError::InvalidPort {
                        value: value.to_string(),
                    })?
                }
                "type" => contact.carrier = value.to_string(),
                _ => {}
            }
        }
        Ok(contact)
    }
}

impl Default for Contact {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{} ({})", self.name, self.to_uri())
        } else if self.name.is_empty() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{} (unresolved)", self.name)
        }
    }
}

/// True for the empty string and the `"..."` placeholder
pub fn is_wildcard(field: &str) -> bool {
    field.is_empty() || field == WILDCARD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_contact_is_invalid() {
        let contact = Contact::empty();
        assert!(!contact.is_valid());
        assert_eq!(contact.port(), -1);
        assert_eq!(contact.registration_line(), "");
    }

    #[test]
    fn test_registration_line_format() {
        let contact = Contact::new("/foo", "10.0.0.1", 10002, "tcp");
        assert_eq!(
            contact.registration_line(),
            "registration name /foo ip 10.0.0.1 port 10002 type tcp\n"
        );
    }

    #[test]
    fn test_parse_registration_line() {
        let parsed =
            Contact::parse_registration_line("registration name /bar ip 127.0.0.1 port 10012 type udp")
                .unwrap();
        assert_eq!(parsed, Contact::new("/bar", "127.0.0.1", 10012, "udp"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Contact::parse_registration_line("hello world").is_err());
        assert!(matches!(
            Contact::parse_registration_line("registration name /x ip h port abc type tcp"),
            Err(AddressError::InvalidPort { .. })
        ));
    }

    #[test]
    fn test_wildcards() {
        let contact = Contact::by_name("/foo");
        assert!(contact.host_missing());
        assert!(contact.carrier_missing());
        assert!(contact.port_missing());
        assert!(!Contact::new("/foo", "h", 5, "tcp").host_missing());
    }
}
