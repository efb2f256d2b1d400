use serde::{Deserialize, Serialize};
use std::fmt;

/// Link and path cost.
pub type Cost = u32;

/// Cost reported for a destination with no known path. Never stored.
pub const UNREACHABLE: Cost = 9999;

/// Name of a host or router.
///
/// Router names start with `R` (either case); every other name is a host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_router(&self) -> bool {
        self.0.starts_with(['R', 'r'])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for Address {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Address {
    fn from(name: String) -> Self {
        Self(name)
    }
}
