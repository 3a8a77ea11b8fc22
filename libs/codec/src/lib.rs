//! # Port Payload Codec
//!
//! ## Purpose
//!
//! The "rules" layer under the protocol engine:
//! - Integer frames used by handshakes, indexes and acks
//! - [`Bottle`], the structured value list and its binary and text forms
//! - [`BufferedWriter`], the pooled block writer every outgoing message goes through
//! - The reader/writer traits that payload types implement
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → network/
//!     ↑           ↓          ↓
//!  Contact    Frames      Carriers
//!  Route      Bottles     Protocol
//!             Buffers     Streams
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Sockets or stream handling (belongs in network/)
//! - Carrier negotiation
//! - Name resolution

pub mod bottle;
pub mod connection;
pub mod error;
pub mod frame;
pub mod writer;

pub use bottle::{Bottle, Value};
pub use connection::{BytesReader, ConnectionReader, ConnectionWriter, PortReader, PortWriter};
pub use error::{CodecError, Result};
pub use frame::{create_yarp_number, interpret_yarp_number, FRAME_LEN, INVALID_FRAME};
pub use writer::{BufferedWriter, INITIAL_POOL_SIZE, MAX_POOL_SIZE};
