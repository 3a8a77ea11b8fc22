//! Name Service
//!
//! ## Purpose
//!
//! Maps logical port names to contacts, fills in whatever a registration
//! leaves unspecified, and answers the name-server command protocol.
//!
//! ## Architecture Role
//!
//! ```text
//! connection handlers ──apply(line)──┐
//!                                    ▼
//!                     ┌──────── NameService ────────┐
//!                     │ Mutex<Registry>             │
//!                     │  names ─ NameRecord          │
//!                     │  hosts ─ HostRecord (ports)  │
//!                     │  mcast ─ McastRecord         │
//!                     │  tmp   ─ DisposableNameRecord│
//!                     └──────────────┬──────────────┘
//!                                    ▼ after unlock
//!                              event listener
//! ```
//!
//! One lock covers the name map and all three free-lists for the whole of
//! each command, reply text included, so no caller ever sees a half-made
//! registration. The lock is never held across I/O: handlers read the
//! request, call in, and write the reply afterwards.

use crate::dispatch::{self, terminate};
use crate::registry::Registry;
use crate::Result;
use codec::{Bottle, Value};
use parking_lot::Mutex;
use std::fmt;
use tracing::{debug, info, warn};
use types::{is_wildcard, Contact, COMMAND_PREFIX, END_OF_MESSAGE, WILDCARD};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameServiceSettings {
    /// First port a host record hands out
    pub base_port: i32,
    /// Stride between consecutive fresh ports on one host
    pub legacy_step: i32,
    /// Port paired with the first multicast group
    pub mcast_base_port: i32,
    /// Prefix of anonymous names
    pub tmp_prefix: String,
    /// Reported by the structured `version` command
    pub version: String,
}

impl Default for NameServiceSettings {
    fn default() -> Self {
        Self {
            base_port: 10_002,
            legacy_step: 10,
            mcast_base_port: 10_002,
            tmp_prefix: "/tmp/port/".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameEventKind {
    Added,
    Removed,
}

/// A registration appeared or went away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEvent {
    pub kind: NameEventKind,
    pub name: String,
}

impl NameEvent {
    pub fn added(name: impl Into<String>) -> Self {
        Self {
            kind: NameEventKind::Added,
            name: name.into(),
        }
    }

    pub fn removed(name: impl Into<String>) -> Self {
        Self {
            kind: NameEventKind::Removed,
            name: name.into(),
        }
    }

    /// `[add] name` or `[del] name`
    pub fn to_bottle(&self) -> Bottle {
        let word = match self.kind {
            NameEventKind::Added => "add",
            NameEventKind::Removed => "del",
        };
        Bottle::new().with(Value::vocab(word)).with(self.name.as_str())
    }
}

impl fmt::Display for NameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_bottle())
    }
}

type EventListener = Box<dyn Fn(&NameEvent) + Send + Sync>;

pub struct NameService {
    registry: Mutex<Registry>,
    listener: Option<EventListener>,
}

impl NameService {
    pub fn new(settings: NameServiceSettings) -> Self {
        Self {
            registry: Mutex::new(Registry::new(settings)),
            listener: None,
        }
    }

    /// Deliver add/del events to `listener`, outside the registry lock
    pub fn with_event_listener(
        mut self,
        listener: impl Fn(&NameEvent) + Send + Sync + 'static,
    ) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn settings(&self) -> NameServiceSettings {
        self.registry.lock().settings().clone()
    }

    /// Register `name` at `address`; wildcard fields are allocated
    ///
    /// `remote` is the host the request came from, used when the address
    /// leaves the host open. A `name` of `...` asks for an anonymous name.
    pub fn register_name(&self, name: &str, address: &Contact, remote: &str) -> Result<Contact> {
        self.locked(|reg| reg.register(name, address, remote))
    }

    pub fn query_name(&self, name: &str) -> Contact {
        self.registry.lock().query(name)
    }

    /// Remove `name`; returns the now-empty registration
    pub fn unregister_name(&self, name: &str) -> Contact {
        self.locked(|reg| reg.unregister(name))
    }

    pub fn add_prop(&self, name: &str, key: &str, value: &str) {
        self.registry.lock().record(name).add_prop(key, value);
    }

    pub fn clear_prop(&self, name: &str, key: &str) {
        self.registry.lock().record(name).clear_prop(key);
    }

    pub fn check_prop(&self, name: &str, key: &str, value: &str) -> bool {
        self.registry
            .lock()
            .find(name)
            .map(|r| r.check_prop(key, value))
            .unwrap_or(false)
    }

    pub fn get_prop(&self, name: &str, key: &str) -> String {
        self.registry
            .lock()
            .find(name)
            .map(|r| r.get_prop(key))
            .unwrap_or_default()
    }

    pub fn match_prop(&self, name: &str, key: &str, prefix: &str) -> String {
        self.registry
            .lock()
            .find(name)
            .map(|r| r.match_prop(key, prefix))
            .unwrap_or_default()
    }

    /// Names holding a record, registered or only carrying properties
    pub fn record_count(&self) -> usize {
        self.registry.lock().record_count()
    }

    /// Released multicast groups waiting for reuse
    pub fn free_multicast_groups(&self) -> usize {
        self.registry.lock().free_multicast_groups()
    }

    /// Every valid registration, ordered by name
    pub fn registrations(&self) -> Vec<Contact> {
        self.registry
            .lock()
            .records()
            .map(|r| r.address().clone())
            .filter(Contact::is_valid)
            .collect()
    }

    /// Answer one text command line
    ///
    /// The line's first token is the command prefix and is ignored; the
    /// second selects the command. Known text commands answer in text,
    /// otherwise the structured set is tried and its bottle printed.
    pub fn apply(&self, line: &str, remote: &Contact) -> String {
        let tokens: Vec<&str> = line
            .split(|c: char| c == '"' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.len() < 2 {
            return "no command given".to_string();
        }
        let key = tokens[1];
        let args = &tokens[2..];
        let remote_host = if is_wildcard(remote.host()) {
            WILDCARD
        } else {
            remote.host()
        };

        let reply = self.locked(|reg| {
            let text = dispatch::dispatch_text(reg, key, remote_host, args);
            match text {
                Some(text) if !text.is_empty() => Some(text),
                _ => dispatch::dispatch_structured(reg, key, args)
                    .map(|b| b.to_string())
                    .filter(|s| !s.is_empty())
                    .map(|s| terminate(&format!("{}\n", s))),
            }
        });

        match reply {
            Some(reply) => {
                debug!(command = key, remote = remote_host, "name server request handled");
                reply
            }
            None => {
                warn!(command = key, "unknown name server command");
                terminate(&format!(
                    "unknown command {}\ntry \"{} help\"\n",
                    line.trim(),
                    COMMAND_PREFIX
                ))
            }
        }
    }

    /// Answer a structured command bottle
    ///
    /// Structured commands answer directly; anything else runs as a text
    /// command and comes back as a single string holding the reply text.
    pub fn apply_bottle(&self, command: &Bottle, remote: &Contact) -> Bottle {
        let words: Vec<String> = command.iter().map(Value::to_plain_string).collect();
        let Some((key, rest)) = words.split_first() else {
            return Bottle::new();
        };
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();

        let structured = self.locked(|reg| dispatch::dispatch_structured(reg, key, &args));
        if let Some(reply) = structured {
            return reply;
        }

        let line = format!("{} {}", COMMAND_PREFIX, command);
        let text = self.apply(&line, remote);
        let text = text.strip_suffix(END_OF_MESSAGE).unwrap_or(&text);
        Bottle::new().with(text.trim_end())
    }

    /// Register this server under its own name
    pub fn register_root(&self, name: &str, address: &Contact) -> Result<Contact> {
        let contact = self.register_name(name, &address.clone().with_name(name), address.host())?;
        info!(name, address = %contact.to_uri(), "name server registered");
        Ok(contact)
    }

    /// Run `f` under the lock, then deliver the events it queued
    fn locked<T>(&self, f: impl FnOnce(&mut Registry) -> T) -> T {
        let (result, events) = {
            let mut reg = self.registry.lock();
            let result = f(&mut reg);
            (result, reg.take_events())
        };
        if let Some(listener) = &self.listener {
            for event in &events {
                listener(event);
            }
        }
        result
    }
}

impl Default for NameService {
    fn default() -> Self {
        Self::new(NameServiceSettings::default())
    }
}
