//! Port Name Service
//!
//! Registry of port names, the free-list allocators that fill in
//! unspecified registration fields, and the text and structured command
//! sets spoken by the name server.
//!
//! ```rust
//! use naming::NameService;
//! use types::Contact;
//!
//! let service = NameService::default();
//! let contact = service
//!     .register_name("/camera", &Contact::by_name("/camera"), "127.0.0.1")
//!     .unwrap();
//! assert_eq!(contact.port(), 10002);
//! assert_eq!(service.query_name("/camera"), contact);
//! ```

pub mod allocators;
pub mod dispatch;
pub mod error;
pub mod record;
mod registry;
pub mod server;

pub use allocators::{DisposableNameRecord, HostRecord, McastRecord, ReusableRecord};
pub use dispatch::{botify, terminate, textify};
pub use error::{RegistryError, Result};
pub use record::{NameRecord, PropertyRecord};
pub use server::{NameEvent, NameEventKind, NameService, NameServiceSettings};
pub use types::{COMMAND_PREFIX, END_OF_MESSAGE};
