use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::EnsembleMember;

/// Canonical identity of an ensemble member, used as the cache key.
///
/// The fingerprint is the lowercase hex SHA-256 of the parameter names, the
/// IEEE-754 bit patterns of their values (in canonical order), and the
/// ensemble index. Negative zero hashes as positive zero.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of `member`.
    #[must_use]
    pub fn of(member: &EnsembleMember) -> Self {
        let mut hasher = Sha256::new();

        for param in member.params.iter() {
            let name = param.name.as_bytes();
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name);

            #[allow(clippy::float_cmp)]
            let value = if param.value == 0.0 { 0.0 } else { param.value };
            hasher.update(value.to_bits().to_le_bytes());
        }
        hasher.update((member.index as u64).to_le_bytes());

        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wraps an existing fingerprint string, e.g. one read back from disk.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
