//! # Port Middleware Configuration
//!
//! Configuration loading and default values for the name server and the
//! connection protocol layer.
//!
//! ## Usage
//!
//! ```rust
//! use mw_config::MiddlewareConfig;
//!
//! let config = MiddlewareConfig::from_toml_str(
//!     "[name_server]\nport = 10100\nnamespace = \"/lab\"\n",
//! )
//! .unwrap();
//! assert_eq!(config.name_server.base_port(), 10102);
//! assert_eq!(config.protocol.initial_pool_size, 1024);
//! ```

pub mod defaults;
pub mod settings;

// Re-export commonly used types
pub use settings::{MiddlewareConfig, NameServerConfig, ProtocolSettings, ENV_PREFIX};
