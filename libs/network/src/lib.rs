//! Port Connection Layer
//!
//! Streams, carriers, and the protocol engine that ties them together into
//! one logical connection between two named ports.
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │ TwoWayStream │◄──┤ Carrier hooks │◄──┤   Protocol   │◄── hosting code
//! │ (tcp/memory) │   │ (tcp, text..) │   │ state machine│
//! └──────────────┘   └───────────────┘   └──────────────┘
//! ```
//!
//! Everything here is blocking `std::io`. Async hosts run protocols on
//! blocking worker threads.

pub mod bootstrap;
pub mod carriers;
pub mod error;
pub mod protocol;
pub mod stream;

pub use bootstrap::{connect_route, NameClient, NameResolver};
pub use carriers::{
    Carrier, CarrierCapabilities, CarrierRegistry, ConnectOutcome, ConnectionState, ContactStyle,
};
pub use error::{Result, TransportError};
pub use protocol::{Protocol, ProtocolState, StreamConnectionReader};
pub use stream::{InterruptHandle, MemoryStream, SocketStream, TwoWayStream};
