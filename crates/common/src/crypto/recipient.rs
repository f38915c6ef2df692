use std::fmt;
use std::str::FromStr;

use super::keys::{PublicKey, SecretKey};

/// Prefix of a key recipient in canonical text form
pub const RECIPIENT_PREFIX: &str = "dcr1";
/// Prefix of a key identity in canonical text form
pub const IDENTITY_PREFIX: &str = "DCHANNEL-SECRET-KEY-";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecipientParseError {
    #[error("recipient '{0}' is missing the '{RECIPIENT_PREFIX}' prefix")]
    MissingPrefix(String),
    #[error("recipient '{0}' is not a valid public key: {1}")]
    InvalidKey(String, String),
    #[error("malformed identity: {0}")]
    InvalidIdentity(String),
}

/// Someone an envelope can be addressed to.
#[derive(Clone, PartialEq, Eq)]
pub enum Recipient {
    Key(PublicKey),
    Passphrase(String),
}

impl fmt::Debug for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Key(key) => write!(f, "Recipient::Key({})", encode_recipient(key)),
            Recipient::Passphrase(_) => f.write_str("Recipient::Passphrase(..)"),
        }
    }
}

impl From<PublicKey> for Recipient {
    fn from(key: PublicKey) -> Self {
        Recipient::Key(key)
    }
}

impl FromStr for Recipient {
    type Err = RecipientParseError;

    /// Parses the canonical text form of a key recipient.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_recipient(s).map(Recipient::Key)
    }
}

/// Something that can open an envelope.
#[derive(Clone)]
pub enum Identity {
    Key(SecretKey),
    Passphrase(String),
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Key(key) => write!(f, "Identity::Key({})", encode_recipient(&key.public())),
            Identity::Passphrase(_) => f.write_str("Identity::Passphrase(..)"),
        }
    }
}

impl From<SecretKey> for Identity {
    fn from(key: SecretKey) -> Self {
        Identity::Key(key)
    }
}

pub fn encode_recipient(key: &PublicKey) -> String {
    format!("{}{}", RECIPIENT_PREFIX, key.to_hex())
}

pub fn parse_recipient(s: &str) -> Result<PublicKey, RecipientParseError> {
    let trimmed = s.trim();
    let hex = trimmed
        .strip_prefix(RECIPIENT_PREFIX)
        .ok_or_else(|| RecipientParseError::MissingPrefix(trimmed.to_string()))?;
    PublicKey::from_hex(hex)
        .map_err(|e| RecipientParseError::InvalidKey(trimmed.to_string(), e.to_string()))
}

pub fn encode_identity(key: &SecretKey) -> String {
    format!("{}{}", IDENTITY_PREFIX, key.to_hex().to_uppercase())
}

pub fn parse_identity(s: &str) -> Result<SecretKey, RecipientParseError> {
    let hex = s
        .trim()
        .strip_prefix(IDENTITY_PREFIX)
        .ok_or_else(|| RecipientParseError::InvalidIdentity("missing prefix".into()))?;
    SecretKey::from_hex(&hex.to_lowercase())
        .map_err(|e| RecipientParseError::InvalidIdentity(e.to_string()))
}
