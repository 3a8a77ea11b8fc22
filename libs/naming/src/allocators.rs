//! Free-list allocators
//!
//! Each allocator hands out values from a monotonic `fresh` source and
//! takes them back with `release`; released values are reused
//! last-in-first-out before anything fresh is issued.
//!
//! ```text
//! get() ──► free stack non-empty? ──yes──► pop
//!                    │
//!                    no
//!                    ▼
//!                 fresh()  (monotonic, may be exhausted)
//! ```

use crate::{RegistryError, Result};
use std::net::Ipv4Addr;
use tracing::debug;

/// Highest TCP/UDP port number a host record may issue
const MAX_PORT: i32 = 65_535;

/// Largest multicast index that still renders inside 224.1.0.0/16
const MAX_MCAST_INDEX: i32 = 255 * 255 - 1;

/// Stack of released values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReusableRecord<T> {
    free: Vec<T>,
}

impl<T> Default for ReusableRecord<T> {
    fn default() -> Self {
        Self { free: Vec::new() }
    }
}

impl<T: PartialEq> ReusableRecord<T> {
    /// Most recently released value, if any
    pub fn get_free(&mut self) -> Option<T> {
        self.free.pop()
    }

    /// Return a value for reuse; releasing the same value twice is a no-op
    pub fn release(&mut self, value: T) {
        if !self.free.contains(&value) {
            self.free.push(value);
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

/// Port numbers on one machine
///
/// Fresh ports start at the base port and advance by a fixed stride so
/// that each port leaves room for companion sockets.
#[derive(Debug, Clone)]
pub struct HostRecord {
    base: i32,
    step: i32,
    issued: i64,
    reusable: ReusableRecord<i32>,
}

impl HostRecord {
    pub fn new(base: i32, step: i32) -> Self {
        Self {
            base,
            step: step.max(1),
            issued: 0,
            reusable: ReusableRecord::default(),
        }
    }

    pub fn fresh(&mut self) -> Result<i32> {
        if self.base > MAX_PORT {
            return Err(RegistryError::exhausted("host ports", self.issued));
        }
        let port = self.base;
        self.base += self.step;
        self.issued += 1;
        Ok(port)
    }

    pub fn get(&mut self) -> Result<i32> {
        match self.reusable.get_free() {
            Some(port) => Ok(port),
            None => self.fresh(),
        }
    }

    pub fn release(&mut self, port: i32) {
        debug!(port, "host port released");
        self.reusable.release(port);
    }

    pub fn free_count(&self) -> usize {
        self.reusable.free_count()
    }
}

/// Multicast groups in 224.1.0.0/16
///
/// Index `x` renders as `224.1.{x / 255 + 1}.{x % 255 + 1}`, so neither of
/// the last two octets is ever 0.
#[derive(Debug, Clone)]
pub struct McastRecord {
    next: i32,
    last: i32,
    base_port: i32,
    reusable: ReusableRecord<i32>,
}

impl McastRecord {
    pub fn new(base_port: i32) -> Self {
        Self {
            next: 0,
            last: 0,
            base_port,
            reusable: ReusableRecord::default(),
        }
    }

    pub fn fresh(&mut self) -> Result<i32> {
        if self.next > MAX_MCAST_INDEX {
            return Err(RegistryError::exhausted(
                "multicast groups",
                i64::from(self.next),
            ));
        }
        let index = self.next;
        self.next += 1;
        Ok(index)
    }

    /// Next group address, reusing released groups first
    pub fn get(&mut self) -> Result<String> {
        let index = match self.reusable.get_free() {
            Some(index) => index,
            None => self.fresh()?,
        };
        self.last = index;
        Ok(Self::render(index))
    }

    /// Released groups waiting to be handed out again
    pub fn free_count(&self) -> usize {
        self.reusable.free_count()
    }

    /// Port paired with the group most recently handed out
    pub fn last_port_number(&self) -> i32 {
        self.base_port + self.last
    }

    /// Return a group; addresses outside 224.1.0.0/16 are ignored
    pub fn release(&mut self, address: &str) {
        match Self::parse(address) {
            Some(index) => {
                debug!(group = address, index, "multicast group released");
                self.reusable.release(index);
            }
            None => debug!(group = address, "not an allocated multicast group"),
        }
    }

    pub fn render(index: i32) -> String {
        format!("224.1.{}.{}", index / 255 + 1, index % 255 + 1)
    }

    fn parse(address: &str) -> Option<i32> {
        let ip: Ipv4Addr = address.parse().ok()?;
        let [a, b, c, d] = ip.octets();
        if a != 224 || b != 1 || c == 0 || d == 0 {
            return None;
        }
        Some((i32::from(c) - 1) * 255 + (i32::from(d) - 1))
    }
}

/// Anonymous port names `<prefix><N>`
#[derive(Debug, Clone)]
pub struct DisposableNameRecord {
    prefix: String,
    next: i32,
    reusable: ReusableRecord<i32>,
}

impl DisposableNameRecord {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
            reusable: ReusableRecord::default(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn get(&mut self) -> String {
        let index = self.reusable.get_free().unwrap_or_else(|| {
            let index = self.next;
            self.next += 1;
            index
        });
        format!("{}{}", self.prefix, index)
    }

    /// Reclaim a name this record issued; false for any other name
    pub fn release(&mut self, name: &str) -> bool {
        let Some(tail) = name.strip_prefix(self.prefix.as_str()) else {
            return false;
        };
        match tail.parse::<i32>() {
            Ok(index) if index > 0 && index < self.next => {
                self.reusable.release(index);
                true
            }
            _ => false,
        }
    }
}
