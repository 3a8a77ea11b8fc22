//! Name registry errors
//!
//! Registry failures are negative answers, not faults: the command
//! interface turns them into reply text and the service keeps running.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A free-list ran out of values to hand out
    #[error("{pool} exhausted after {issued} allocations")]
    Exhausted { pool: &'static str, issued: i64 },

    /// A command was given the wrong arguments
    #[error("{message}")]
    BadArguments { message: String },

    /// No dispatcher knows this command
    #[error("unknown command '{command}'")]
    UnknownCommand { command: String },
}

impl RegistryError {
    pub fn exhausted(pool: &'static str, issued: i64) -> Self {
        Self::Exhausted { pool, issued }
    }

    pub fn bad_arguments(message: impl Into<String>) -> Self {
        Self::BadArguments {
            message: message.into(),
        }
    }

    pub fn unknown_command(command: impl Into<String>) -> Self {
        Self::UnknownCommand {
            command: command.into(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            RegistryError::Exhausted { .. } => "exhausted",
            RegistryError::BadArguments { .. } => "arguments",
            RegistryError::UnknownCommand { .. } => "command",
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RegistryError::exhausted("multicast groups", 65_025);
        assert_eq!(err.to_string(), "multicast groups exhausted after 65025 allocations");
        assert_eq!(err.category(), "exhausted");

        let err = RegistryError::unknown_command("frobnicate");
        assert_eq!(err.to_string(), "unknown command 'frobnicate'");
    }
}
