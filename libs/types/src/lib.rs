//! # Port Addressing Types
//!
//! Shared value types for the port middleware: where a port lives
//! ([`Contact`]) and which two ports a connection joins ([`Route`]).
//!
//! ## Integration Points
//!
//! ```text
//! naming (registry) ──► Contact ──► network (bootstrap) ──► Route ──► Protocol
//! ```
//!
//! Both types are plain values. They are cloned freely and never shared
//! behind locks.

pub mod contact;
pub mod errors;
pub mod route;

pub use contact::{is_wildcard, Contact, WILDCARD};
pub use errors::AddressError;
pub use route::Route;

/// First token of every name-server text command
pub const COMMAND_PREFIX: &str = "NAME_SERVER";

/// Line closing every complete name-server text reply
pub const END_OF_MESSAGE: &str = "*** end of message";
