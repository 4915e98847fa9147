//! Stable record identity
//!
//! A record's identity is derived from its fully-qualified name and address
//! only, so it survives the remote authority handing out a fresh record id on
//! every create/delete cycle.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of digest bytes kept in the hex token
const IDENTITY_BYTES: usize = 8;

/// Opaque correlation token for a `(name, address)` pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordIdentity(String);

impl RecordIdentity {
    /// Derive the identity of a `(name, address)` pair. Names are compared
    /// case-insensitively, as DNS does.
    pub fn derive(name: &str, address: Ipv4Addr) -> Self {
        let name = name.to_ascii_lowercase();
        let digest = Sha256::digest(format!("{name}:{address}").as_bytes());
        Self(hex::encode(&digest[..IDENTITY_BYTES]))
    }

    /// Wrap an identity received from a caller
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty token marks a document entry written before identities existed
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
