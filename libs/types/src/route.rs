//! Connection routes
//!
//! A [`Route`] names both ends of one connection plus the carrier that
//! carries it. The carrier name is only final once negotiation succeeded.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    from_name: String,
    to_name: String,
    carrier_name: String,
}

impl Route {
    pub fn new(
        from_name: impl Into<String>,
        to_name: impl Into<String>,
        carrier_name: impl Into<String>,
    ) -> Self {
        Self {
            from_name: from_name.into(),
            to_name: to_name.into(),
            carrier_name: carrier_name.into(),
        }
    }

    pub fn from_name(&self) -> &str {
        &self.from_name
    }

    pub fn to_name(&self) -> &str {
        &self.to_name
    }

    pub fn carrier_name(&self) -> &str {
        &self.carrier_name
    }

    pub fn with_from(mut self, from_name: impl Into<String>) -> Self {
        self.from_name = from_name.into();
        self
    }

    pub fn with_to(mut self, to_name: impl Into<String>) -> Self {
        self.to_name = to_name.into();
        self
    }

    pub fn with_carrier(mut self, carrier_name: impl Into<String>) -> Self {
        self.carrier_name = carrier_name.into();
        self
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{}->{}",
            self.from_name, self.carrier_name, self.to_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_builders() {
        let route = Route::default()
            .with_from("/writer")
            .with_to("/reader")
            .with_carrier("tcp");
        assert_eq!(route.from_name(), "/writer");
        assert_eq!(route.to_name(), "/reader");
        assert_eq!(route.to_string(), "/writer->tcp->/reader");
    }
}
