//! Wrapping a content secret under a passphrase-derived key.
//!
//! The key-encryption key is HKDF-SHA256 over the passphrase with a random
//! per-envelope salt; the content secret is AES-KW wrapped under it.

use aes_kw::KekAes256 as Kek;
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::secret::{Secret, SecretError, SECRET_SIZE};

pub const SALT_SIZE: usize = 16;
const KEK_INFO: &[u8] = b"dchannel/passphrase-kek/v1";

#[derive(Debug, thiserror::Error)]
pub enum PassphraseShareError {
    #[error("passphrase share error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassphraseShare {
    salt: [u8; SALT_SIZE],
    wrapped: Vec<u8>,
}

fn derive_kek(passphrase: &str, salt: &[u8; SALT_SIZE]) -> Result<Kek, PassphraseShareError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), passphrase.as_bytes());
    let mut okm = [0u8; SECRET_SIZE];
    hk.expand(KEK_INFO, &mut okm)
        .map_err(|_| anyhow::anyhow!("HKDF expand error"))?;
    Ok(Kek::from(okm))
}

impl PassphraseShare {
    pub fn new(secret: &Secret, passphrase: &str) -> Result<Self, PassphraseShareError> {
        let mut salt = [0u8; SALT_SIZE];
        getrandom::getrandom(&mut salt).map_err(|e| anyhow::anyhow!("salt error: {}", e))?;

        let wrapped = derive_kek(passphrase, &salt)?
            .wrap_vec(secret.bytes())
            .map_err(|_| anyhow::anyhow!("AES-KW wrap error"))?;
        Ok(Self { salt, wrapped })
    }

    pub fn recover(&self, passphrase: &str) -> Result<Secret, PassphraseShareError> {
        let unwrapped = derive_kek(passphrase, &self.salt)?
            .unwrap_vec(&self.wrapped)
            .map_err(|_| anyhow::anyhow!("AES-KW unwrap error"))?;
        Ok(Secret::from_slice(&unwrapped)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passphrase_share() {
        let secret = Secret::generate();
        let share = PassphraseShare::new(&secret, "correct horse").unwrap();

        assert_eq!(share.recover("correct horse").unwrap(), secret);
        assert!(share.recover("battery staple").is_err());
    }

    #[test]
    fn test_salt_is_random() {
        let secret = Secret::generate();
        let a = PassphraseShare::new(&secret, "pw").unwrap();
        let b = PassphraseShare::new(&secret, "pw").unwrap();
        assert_ne!(a, b);
    }
}
