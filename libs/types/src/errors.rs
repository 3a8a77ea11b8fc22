//! Error types for address parsing

use thiserror::Error;

/// Errors raised while interpreting textual addresses
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AddressError {
    /// Line did not follow the `registration name .. ip .. port .. type ..` layout
    #[error("Malformed registration line: '{line}'")]
    MalformedRegistration { line: String },

    /// Port field was not an integer
    #[error("Invalid port number: '{value}'")]
    InvalidPort { value: String },
}
