//! Identity keyring
//!
//! A keyring is an append-only list of decryption keys plus the one public
//! key new posts are encrypted to. Rotation appends; nothing is ever
//! removed, so every historical post stays readable.

mod cell;
mod store;

use serde::{Deserialize, Serialize};

use crate::crypto::{
    encode_identity, encode_recipient, envelope, parse_identity, parse_recipient, EnvelopeError,
    Identity, PublicKey, Recipient, RecipientParseError, SecretKey,
};

pub use cell::{IdentityCell, KeyNotReady};
pub use store::IdentityStore;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity file could not be decrypted: {0}")]
    Decryption(#[from] EnvelopeError),
    #[error("identity file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("identity file holds a bad key: {0}")]
    Parse(#[from] RecipientParseError),
    #[error("identity file is inconsistent: {0}")]
    Inconsistent(&'static str),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// On-disk shape, every key in its canonical text form.
#[derive(Debug, Serialize, Deserialize)]
struct KeyringDocument {
    identities: Vec<String>,
    recipient: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyring {
    identities: Vec<SecretKey>,
    recipient: PublicKey,
}

impl Keyring {
    pub fn generate() -> Self {
        let key = SecretKey::generate();
        Self {
            recipient: key.public(),
            identities: vec![key],
        }
    }

    /// Append a fresh key and make it current. Returns the new recipient.
    pub fn rotate(&mut self) -> PublicKey {
        let key = SecretKey::generate();
        self.recipient = key.public();
        self.identities.push(key);
        self.recipient
    }

    /// Current public key; the only one new posts are encrypted to.
    pub fn recipient(&self) -> PublicKey {
        self.recipient
    }

    pub fn identities(&self) -> &[SecretKey] {
        &self.identities
    }

    /// Every key this keyring has ever held, newest first.
    pub fn decryption_identities(&self) -> Vec<Identity> {
        self.identities
            .iter()
            .rev()
            .cloned()
            .map(Identity::Key)
            .collect()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, IdentityError> {
        let doc = KeyringDocument {
            identities: self.identities.iter().map(encode_identity).collect(),
            recipient: encode_recipient(&self.recipient),
        };
        Ok(serde_json::to_vec_pretty(&doc)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, IdentityError> {
        let doc: KeyringDocument = serde_json::from_slice(data)?;
        let identities = doc
            .identities
            .iter()
            .map(|s| parse_identity(s))
            .collect::<Result<Vec<_>, _>>()?;
        let recipient = parse_recipient(&doc.recipient)?;

        if identities.is_empty() {
            return Err(IdentityError::Inconsistent("no identities"));
        }
        if !identities.iter().any(|key| key.public() == recipient) {
            return Err(IdentityError::Inconsistent(
                "recipient does not belong to any identity",
            ));
        }
        Ok(Self {
            identities,
            recipient,
        })
    }

    /// Serialize for storage, encrypted under `passphrase` when one is given.
    pub fn seal(&self, passphrase: Option<&str>, armor: bool) -> Result<Vec<u8>, IdentityError> {
        let json = self.to_json()?;
        match passphrase {
            Some(pass) => Ok(envelope::encrypt(
                &[Recipient::Passphrase(pass.to_string())],
                &json,
                armor,
            )?),
            None => Ok(json),
        }
    }

    /// Inverse of [`Keyring::seal`]. A plaintext file opens with or without
    /// a passphrase.
    pub fn open(data: &[u8], passphrase: Option<&str>) -> Result<Self, IdentityError> {
        let identities: Vec<Identity> = passphrase
            .map(|pass| Identity::Passphrase(pass.to_string()))
            .into_iter()
            .collect();
        let json = envelope::decrypt(&identities, data)?;
        Self::from_json(&json)
    }
}
