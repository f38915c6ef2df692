use object_store::ContentAddress;
use serde::{Deserialize, Serialize};

use super::NamingError;
use crate::crypto::{PublicKey, SecretKey, Signature};

pub const NAME_PREFIX: &str = "dcn1";

/// External name owned by a naming key.
pub fn name_for(key: &PublicKey) -> String {
    format!("{}{}", NAME_PREFIX, key.to_hex())
}

/// The naming key that owns `name`, or `InvalidName` when it is not one.
pub fn owner_of(name: &str) -> Result<PublicKey, NamingError> {
    name.strip_prefix(NAME_PREFIX)
        .and_then(|hex| PublicKey::from_hex(hex).ok())
        .ok_or_else(|| NamingError::InvalidName(name.to_string()))
}

/// A signed `name -> address` binding. Higher sequences supersede lower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    pub name: String,
    pub value: ContentAddress,
    pub sequence: u64,
    pub signature: Signature,
}

fn signable(name: &str, value: &ContentAddress, sequence: u64) -> Vec<u8> {
    let value = value.to_string();
    let mut msg = Vec::with_capacity(name.len() + value.len() + 10);
    msg.extend_from_slice(name.as_bytes());
    msg.push(0);
    msg.extend_from_slice(value.as_bytes());
    msg.push(0);
    msg.extend_from_slice(&sequence.to_be_bytes());
    msg
}

impl NameRecord {
    pub fn sign(key: &SecretKey, value: ContentAddress, sequence: u64) -> Self {
        let name = name_for(&key.public());
        let signature = key.sign(&signable(&name, &value, sequence));
        Self {
            name,
            value,
            sequence,
            signature,
        }
    }

    pub fn verify(&self) -> Result<(), NamingError> {
        let owner = owner_of(&self.name)?;
        owner
            .verify(
                &signable(&self.name, &self.value, self.sequence),
                &self.signature,
            )
            .map_err(|_| NamingError::BadSignature(self.name.clone()))
    }
}
