//! Per-name registry entries

use std::collections::BTreeMap;
use std::fmt;
use types::Contact;

/// Unordered set of string values under one property key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyRecord {
    values: Vec<String>,
}

impl PropertyRecord {
    pub fn add(&mut self, value: impl Into<String>) {
        let value = value.into();
        if !self.values.contains(&value) {
            self.values.push(value);
        }
    }

    pub fn check(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    /// Values starting with `prefix`, space separated
    pub fn match_prefix(&self, prefix: &str) -> String {
        self.values
            .iter()
            .filter(|v| v.starts_with(prefix))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for PropertyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.values.join(" "))
    }
}

/// A registered name: its address, which parts of the address came from
/// free-lists, and free-form properties
#[derive(Debug, Clone)]
pub struct NameRecord {
    address: Contact,
    reusable_port: bool,
    reusable_ip: bool,
    props: BTreeMap<String, PropertyRecord>,
}

impl Default for NameRecord {
    fn default() -> Self {
        Self {
            address: Contact::empty(),
            reusable_port: false,
            reusable_ip: false,
            props: BTreeMap::new(),
        }
    }
}

impl NameRecord {
    pub fn address(&self) -> &Contact {
        &self.address
    }

    /// The port came from a host record and goes back on release
    pub fn is_reusable_port(&self) -> bool {
        self.reusable_port
    }

    /// The host came from the multicast record and goes back on release
    pub fn is_reusable_ip(&self) -> bool {
        self.reusable_ip
    }

    pub fn set_address(&mut self, address: Contact, reusable_port: bool, reusable_ip: bool) {
        self.address = address;
        self.reusable_port = reusable_port;
        self.reusable_ip = reusable_ip;
    }

    /// Forget the address and every property
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn add_prop(&mut self, key: &str, value: impl Into<String>) {
        self.props.entry(key.to_string()).or_default().add(value);
    }

    pub fn clear_prop(&mut self, key: &str) {
        self.props.remove(key);
    }

    pub fn check_prop(&self, key: &str, value: &str) -> bool {
        self.props.get(key).map(|p| p.check(value)).unwrap_or(false)
    }

    /// All values of `key`, space separated; empty when unset
    pub fn get_prop(&self, key: &str) -> String {
        self.props.get(key).map(|p| p.to_string()).unwrap_or_default()
    }

    pub fn match_prop(&self, key: &str, prefix: &str) -> String {
        self.props
            .get(key)
            .map(|p| p.match_prefix(prefix))
            .unwrap_or_default()
    }
}
