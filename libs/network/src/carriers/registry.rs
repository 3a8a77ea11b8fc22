//! Carrier registry
//!
//! Ordered prototypes. Selection by header walks the list front to back and
//! the first carrier whose `check_header` matches wins, so registration
//! order is part of the wire behaviour.

use super::{
    Carrier, ChecksumCarrier, McastCarrier, NameserCarrier, ShmemCarrier, TcpCarrier,
    TextCarrier, UdpCarrier,
};
use crate::{Result, TransportError};
use tracing::debug;

/// Names of the built-in carriers in default registration order
pub const DEFAULT_CARRIERS: &[&str] = &[
    "tcp", "fast_tcp", "text", "text_ack", "name_ser", "udp", "mcast", "shmem", "crc",
];

pub struct CarrierRegistry {
    prototypes: Vec<Box<dyn Carrier>>,
}

impl CarrierRegistry {
    pub fn empty() -> Self {
        Self {
            prototypes: Vec::new(),
        }
    }

    /// Every built-in carrier in default order
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for name in DEFAULT_CARRIERS {
            if let Some(carrier) = builtin(name) {
                registry.prototypes.push(carrier);
            }
        }
        registry
    }

    /// Built-in carriers in the given order; unknown names are rejected
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut registry = Self::empty();
        for name in names {
            let name = name.as_ref();
            let carrier = builtin(name).ok_or_else(|| {
                TransportError::configuration(format!("unknown carrier '{}'", name), Some("carriers"))
            })?;
            registry.register(carrier)?;
        }
        Ok(registry)
    }

    /// Append a prototype; names must be unique
    pub fn register(&mut self, prototype: Box<dyn Carrier>) -> Result<()> {
        if self.prototypes.iter().any(|p| p.name() == prototype.name()) {
            return Err(TransportError::configuration(
                format!("carrier '{}' registered twice", prototype.name()),
                Some("carriers"),
            ));
        }
        debug!(carrier = prototype.name(), "carrier registered");
        self.prototypes.push(prototype);
        Ok(())
    }

    /// First carrier in registration order that claims `header`
    pub fn choose_by_header(&self, header: &[u8]) -> Option<Box<dyn Carrier>> {
        self.prototypes
            .iter()
            .find(|p| p.check_header(header))
            .map(|p| p.create())
    }

    pub fn choose_by_name(&self, name: &str) -> Option<Box<dyn Carrier>> {
        self.prototypes
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.create())
    }

    pub fn names(&self) -> Vec<&str> {
        self.prototypes.iter().map(|p| p.name()).collect()
    }

    /// How many registered carriers claim `header`
    pub fn count_matches(&self, header: &[u8]) -> usize {
        self.prototypes
            .iter()
            .filter(|p| p.check_header(header))
            .count()
    }
}

impl Default for CarrierRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn builtin(name: &str) -> Option<Box<dyn Carrier>> {
    let carrier: Box<dyn Carrier> = match name {
        "tcp" => Box::new(TcpCarrier::new()),
        "fast_tcp" => Box::new(TcpCarrier::fast()),
        "text" => Box::new(TextCarrier::new()),
        "text_ack" => Box::new(TextCarrier::with_ack()),
        "name_ser" => Box::new(NameserCarrier::new()),
        "udp" => Box::new(UdpCarrier::new()),
        "mcast" => Box::new(McastCarrier::new()),
        "shmem" => Box::new(ShmemCarrier::new()),
        "crc" => Box::new(ChecksumCarrier::new()),
        _ => return None,
    };
    Some(carrier)
}
