//! Name Server Service
//!
//! Hosts a [`naming::NameService`] behind a TCP listener. Clients connect
//! with any registered carrier: text carriers send `NAME_SERVER <command>`
//! lines, binary carriers send command bottles.

pub mod handler;
pub mod server;

pub use handler::handle_connection;
pub use server::{service_settings, NameServer};
