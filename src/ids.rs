//! Time-ordered 128-bit identifiers for every entity in the data model.
//!
//! Grounded on the `ulid` crate, used for the same purpose elsewhere in the
//! retrieval pack (e.g. `abitofhelp-adaptive_pipeline`, `surrealdb`). ULIDs
//! sort lexicographically by creation time, which gives the store
//! interfaces a cheap "most recent first/last" ordering without a secondary
//! index.

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Id(Ulid);

impl Id {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn nil() -> Self {
        Self(Ulid::nil())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Ulid::from_string(s).ok().map(Self)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Id {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}
