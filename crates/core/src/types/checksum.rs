//! Content checksums used as cache keys and de-duplication identity

use super::flags::{FlagSet, FlagValue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{self, Display};

/// Hex-encoded SHA-256 over the canonical form of a flag set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Compute the checksum of a flag set.
    ///
    /// Every name and value is length- or tag-prefixed so that no two distinct
    /// mappings share a byte stream.
    pub fn of(flags: &FlagSet) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((flags.len() as u64).to_le_bytes());
        for (name, value) in flags.iter() {
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            match value {
                FlagValue::Bool(b) => {
                    hasher.update([0u8]);
                    hasher.update([u8::from(b)]);
                }
                FlagValue::Int(level) => {
                    hasher.update([1u8]);
                    hasher.update(level.to_le_bytes());
                }
            }
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines; the whole string if it is shorter
    /// or not cut cleanly at 12 bytes
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
