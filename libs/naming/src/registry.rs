//! Lock-protected registry state
//!
//! Everything here runs with the service lock held. Operations queue their
//! add/del events instead of delivering them, so listeners never run under
//! the lock.

use crate::allocators::{DisposableNameRecord, HostRecord, McastRecord};
use crate::record::NameRecord;
use crate::{NameEvent, NameServiceSettings, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};
use types::{is_wildcard, Contact, WILDCARD};

/// Host used when neither the request nor the connection names one
const LOCAL_HOST: &str = "127.0.0.1";

pub(crate) struct Registry {
    settings: NameServiceSettings,
    names: BTreeMap<String, NameRecord>,
    hosts: HashMap<String, HostRecord>,
    mcast: McastRecord,
    tmp_names: DisposableNameRecord,
    events: Vec<NameEvent>,
}

impl Registry {
    pub(crate) fn new(settings: NameServiceSettings) -> Self {
        Self {
            mcast: McastRecord::new(settings.mcast_base_port),
            tmp_names: DisposableNameRecord::new(settings.tmp_prefix.clone()),
            settings,
            names: BTreeMap::new(),
            hosts: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub(crate) fn settings(&self) -> &NameServiceSettings {
        &self.settings
    }

    pub(crate) fn take_events(&mut self) -> Vec<NameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Record for `name`, created empty if missing
    pub(crate) fn record(&mut self, name: &str) -> &mut NameRecord {
        self.names.entry(name.to_string()).or_default()
    }

    pub(crate) fn find(&self, name: &str) -> Option<&NameRecord> {
        self.names.get(name)
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &NameRecord> {
        self.names.values()
    }

    pub(crate) fn record_count(&self) -> usize {
        self.names.len()
    }

    pub(crate) fn free_multicast_groups(&self) -> usize {
        self.mcast.free_count()
    }

    fn host_record(&mut self, machine: &str) -> &mut HostRecord {
        let base = self.settings.base_port;
        let step = self.settings.legacy_step;
        self.hosts
            .entry(machine.to_string())
            .or_insert_with(|| HostRecord::new(base, step))
    }

    pub(crate) fn register(&mut self, name: &str, address: &Contact, remote: &str) -> Result<Contact> {
        if name != WILDCARD {
            self.unregister(name);
        }

        let suggestion = if address.is_valid() {
            address.clone()
        } else {
            Contact::by_name(name)
        };

        let port_name = if name == WILDCARD {
            self.tmp_names.get()
        } else {
            name.to_string()
        };

        let carrier = if suggestion.carrier_missing() {
            "tcp".to_string()
        } else {
            suggestion.carrier().to_string()
        };

        let mut reusable_port = false;
        let mut reusable_ip = false;
        let mut override_port = 0;
        let machine = if !suggestion.host_missing() {
            suggestion.host().to_string()
        } else if carrier == "mcast" {
            let group = self.mcast.get()?;
            override_port = self.mcast.last_port_number();
            reusable_ip = true;
            group
        } else if is_wildcard(remote) {
            warn!(name = %port_name, "remote machine unknown, assuming it is local");
            LOCAL_HOST.to_string()
        } else {
            remote.to_string()
        };

        let port = if !suggestion.port_missing() {
            suggestion.port()
        } else if override_port != 0 {
            override_port
        } else {
            let allocated = self.host_record(&machine).get();
            match allocated {
                Ok(port) => {
                    reusable_port = true;
                    port
                }
                Err(e) => {
                    if reusable_ip {
                        self.mcast.release(&machine);
                    }
                    return Err(e);
                }
            }
        };

        let contact = Contact::new(port_name.as_str(), machine, port, carrier);
        debug!(name = %port_name, address = %contact.to_uri(), "registering");
        self.record(&port_name)
            .set_address(contact.clone(), reusable_port, reusable_ip);
        self.events.push(NameEvent::added(port_name));
        Ok(contact)
    }

    /// Current registration for `name`, honouring the `/net=<prefix>/name` form
    pub(crate) fn query(&self, name: &str) -> Contact {
        let (base, pattern) = split_net_query(name);
        let Some(record) = self.find(base) else {
            return Contact::empty();
        };
        if let Some(pattern) = pattern {
            let ips = record.match_prop("ips", pattern);
            if let Some(ip) = ips.split(' ').find(|ip| !ip.is_empty()) {
                return record.address().clone().with_host(ip);
            }
        }
        record.address().clone()
    }

    pub(crate) fn unregister(&mut self, name: &str) -> Contact {
        let prev = self.query(name);
        if prev.is_valid() {
            let reg_name = prev.name().to_string();
            let (reusable_port, reusable_ip, address) = match self.find(&reg_name) {
                Some(record) => (
                    record.is_reusable_port(),
                    record.is_reusable_ip(),
                    record.address().clone(),
                ),
                None => (false, false, prev.clone()),
            };
            if reusable_port {
                self.host_record(prev.host()).release(prev.port());
            }
            if reusable_ip && address.carrier() == "mcast" {
                self.mcast.release(address.host());
            }
            self.names.remove(&reg_name);
            self.tmp_names.release(name);
            debug!(name, "unregistered");
            self.events.push(NameEvent::removed(name));
        }
        self.query(name)
    }
}

/// Split `/net=<prefix>/name` into (`/name`, `Some(prefix)`)
fn split_net_query(name: &str) -> (&str, Option<&str>) {
    let Some(rest) = name.strip_prefix("/net=") else {
        return (name, None);
    };
    match rest.find('/') {
        Some(end) => (&rest[end..], Some(&rest[..end])),
        None => (name, None),
    }
}
