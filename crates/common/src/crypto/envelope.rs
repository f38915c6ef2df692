//! Recipient-addressed envelopes
//!
//! Binary layout:
//!
//! ```text
//! MAGIC (8) || header_len (u32 BE) || bincode(Header) || Secret::encrypt(plaintext)
//! ```
//!
//! The header holds one stanza per recipient, each wrapping the same
//! per-message [`Secret`]. The armored form is the binary envelope inside a
//! PEM block. Input carrying neither framing is not an envelope and is
//! returned from [`decrypt`] unchanged.

use std::io::Read;

use serde::{Deserialize, Serialize};

use super::passphrase::{PassphraseShare, PassphraseShareError};
use super::recipient::{Identity, Recipient};
use super::secret::{Secret, SecretError};
use super::secret_share::{SecretShare, SecretShareError};

pub const MAGIC: &[u8; 8] = b"DCHENV1\n";
pub const ARMOR_TAG: &str = "DCHANNEL ENCRYPTED MESSAGE";
const ARMOR_BEGIN: &str = "-----BEGIN DCHANNEL ENCRYPTED MESSAGE-----";
const VERSION: u8 = 1;
const LEN_SIZE: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope needs at least one recipient")]
    NoRecipients,
    #[error("no identity matched any recipient of the envelope")]
    NoMatchingIdentity,
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("share error: {0}")]
    Share(#[from] SecretShareError),
    #[error("passphrase error: {0}")]
    Passphrase(#[from] PassphraseShareError),
}

#[derive(Debug, Serialize, Deserialize)]
enum Stanza {
    Key(SecretShare),
    Passphrase(PassphraseShare),
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    version: u8,
    stanzas: Vec<Stanza>,
}

impl Stanza {
    fn unwrap_with(&self, identity: &Identity) -> Option<Secret> {
        match (self, identity) {
            (Stanza::Key(share), Identity::Key(key)) => share.recover(key).ok(),
            (Stanza::Passphrase(share), Identity::Passphrase(pass)) => share.recover(pass).ok(),
            _ => None,
        }
    }
}

/// Framing detected on a decrypt input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Armored,
    Binary,
    Plain,
}

pub fn detect(data: &[u8]) -> Framing {
    if data.starts_with(MAGIC) {
        return Framing::Binary;
    }
    let trimmed = data.trim_ascii_start();
    if trimmed.starts_with(ARMOR_BEGIN.as_bytes()) {
        Framing::Armored
    } else {
        Framing::Plain
    }
}

/// Encrypt `plaintext` for every recipient.
pub fn encrypt(
    recipients: &[Recipient],
    plaintext: &[u8],
    armor: bool,
) -> Result<Vec<u8>, EnvelopeError> {
    if recipients.is_empty() {
        return Err(EnvelopeError::NoRecipients);
    }

    let secret = Secret::generate();
    let stanzas = recipients
        .iter()
        .map(|recipient| {
            Ok(match recipient {
                Recipient::Key(key) => Stanza::Key(SecretShare::new(&secret, key)?),
                Recipient::Passphrase(pass) => {
                    Stanza::Passphrase(PassphraseShare::new(&secret, pass)?)
                }
            })
        })
        .collect::<Result<Vec<_>, EnvelopeError>>()?;

    let header = bincode::serialize(&Header {
        version: VERSION,
        stanzas,
    })
    .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    let header_len = u32::try_from(header.len())
        .map_err(|_| EnvelopeError::Malformed("header too large".into()))?;
    let body = secret.encrypt(plaintext)?;

    let mut out = Vec::with_capacity(MAGIC.len() + LEN_SIZE + header.len() + body.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&header_len.to_be_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(&body);

    if armor {
        Ok(pem::encode(&pem::Pem::new(ARMOR_TAG, out)).into_bytes())
    } else {
        Ok(out)
    }
}

/// Streaming form of [`encrypt`].
pub fn encrypt_reader<R: Read>(
    recipients: &[Recipient],
    mut reader: R,
    armor: bool,
) -> Result<Vec<u8>, EnvelopeError> {
    let mut plaintext = Vec::new();
    reader.read_to_end(&mut plaintext)?;
    encrypt(recipients, &plaintext, armor)
}

/// Decrypt an envelope with the first identity that unwraps it.
///
/// Input that is not an envelope at all is returned unchanged, even with
/// no identities.
pub fn decrypt(identities: &[Identity], data: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    match detect(data) {
        Framing::Plain => Ok(data.to_vec()),
        Framing::Binary => open_binary(identities, data),
        Framing::Armored => {
            let text = std::str::from_utf8(data)
                .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
            let block =
                pem::parse(text.trim()).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
            if block.tag() != ARMOR_TAG {
                return Err(EnvelopeError::Malformed(format!(
                    "unexpected armor tag {}",
                    block.tag()
                )));
            }
            open_binary(identities, block.contents())
        }
    }
}

/// Streaming form of [`decrypt`].
pub fn decrypt_reader<R: Read>(
    identities: &[Identity],
    mut reader: R,
) -> Result<Vec<u8>, EnvelopeError> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    decrypt(identities, &data)
}

fn open_binary(identities: &[Identity], data: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let rest = data
        .strip_prefix(MAGIC.as_slice())
        .ok_or_else(|| EnvelopeError::Malformed("missing magic".into()))?;
    if rest.len() < LEN_SIZE {
        return Err(EnvelopeError::Malformed("truncated header length".into()));
    }
    let (len_bytes, rest) = rest.split_at(LEN_SIZE);
    let mut len = [0u8; LEN_SIZE];
    len.copy_from_slice(len_bytes);
    let header_len = u32::from_be_bytes(len) as usize;
    if rest.len() < header_len {
        return Err(EnvelopeError::Malformed("truncated header".into()));
    }
    let (header_bytes, body) = rest.split_at(header_len);

    let header: Header = bincode::deserialize(header_bytes)
        .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    if header.version != VERSION {
        return Err(EnvelopeError::UnsupportedVersion(header.version));
    }

    let secret = identities
        .iter()
        .find_map(|identity| {
            header
                .stanzas
                .iter()
                .find_map(|stanza| stanza.unwrap_with(identity))
        })
        .ok_or(EnvelopeError::NoMatchingIdentity)?;

    Ok(secret.decrypt(body)?)
}
