//! Integration capability bits.
//!
//! What the configured database login is allowed to do on the server, as
//! determined by the capability prober.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Bitset over {Read, Write, Create}.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    /// Can read the permission catalogs.
    pub const READ: Capabilities = Capabilities(0b001);
    /// Can grant and revoke privileges.
    pub const WRITE: Capabilities = Capabilities(0b010);
    /// Can create logins.
    pub const CREATE: Capabilities = Capabilities(0b100);
    pub const ALL: Capabilities = Capabilities(0b111);

    const NAMED: [(Capabilities, &'static str); 3] = [
        (Capabilities::READ, "Read"),
        (Capabilities::WRITE, "Write"),
        (Capabilities::CREATE, "Create"),
    ];

    #[must_use]
    pub fn from_flags(read: bool, write: bool, create: bool) -> Self {
        let mut caps = Capabilities::NONE;
        if read {
            caps = caps | Capabilities::READ;
        }
        if write {
            caps = caps | Capabilities::WRITE;
        }
        if create {
            caps = caps | Capabilities::CREATE;
        }
        caps
    }

    #[must_use]
    pub fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Bits in `required` that `self` lacks.
    #[must_use]
    pub fn missing(self, required: Capabilities) -> Capabilities {
        Capabilities(required.0 & !self.0 & Capabilities::ALL.0)
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        Capabilities(self.0 | rhs.0)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "None");
        }
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join(", "))
    }
}
