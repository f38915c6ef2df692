//! Content addresses for uploaded bundles.

use std::fmt;
use std::str::FromStr;

use cid::multihash::Multihash;
use cid::Cid;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Multicodec code for raw bytes
const RAW_CODEC: u64 = 0x55;
/// Multihash code for BLAKE3-256
const BLAKE3_CODE: u64 = 0x1e;

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("invalid content address '{0}': {1}")]
    Parse(String, cid::Error),
    #[error("unsupported content address '{0}'")]
    Unsupported(String),
}

/// Hash-derived identifier of an immutable bundle.
///
/// A CIDv1 with the raw codec over the BLAKE3 digest of the bundle's
/// canonical index. The textual form is the multibase CID string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentAddress(Cid);

impl ContentAddress {
    /// Derive the address of the given canonical bytes.
    pub fn of(canonical: &[u8]) -> Self {
        let digest = blake3::hash(canonical);
        // a 32 byte digest always fits in a 64 byte multihash
        let hash = Multihash::<64>::wrap(BLAKE3_CODE, digest.as_bytes())
            .unwrap_or_else(|_| unreachable!("blake3 digest fits in multihash"));
        Self(Cid::new_v1(RAW_CODEC, hash))
    }

    pub fn cid(&self) -> &Cid {
        &self.0
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches("/ipfs/");
        let cid = Cid::from_str(trimmed).map_err(|e| AddressError::Parse(s.to_string(), e))?;
        if cid.hash().code() != BLAKE3_CODE {
            return Err(AddressError::Unsupported(s.to_string()));
        }
        Ok(Self(cid))
    }
}

impl Serialize for ContentAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for ContentAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
