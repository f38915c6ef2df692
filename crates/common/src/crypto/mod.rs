//! Cryptographic primitives for dchannel
//!
//! - **Keys**: Ed25519 keypairs. The same key decrypts posts (after
//!   conversion to X25519) and signs name records.
//! - **Content encryption**: every envelope gets a fresh ChaCha20-Poly1305
//!   [`Secret`].
//! - **Key wrapping**: the secret is wrapped once per recipient, either for a
//!   public key ([`SecretShare`], ephemeral ECDH + AES-KW) or under a
//!   passphrase ([`PassphraseShare`], HKDF + AES-KW).
//! - **Envelopes**: [`envelope`] frames the wrapped secrets and the
//!   ciphertext, optionally armored as PEM text.

pub mod envelope;
mod keys;
mod passphrase;
mod recipient;
mod secret;
mod secret_share;

pub use ed25519_dalek::Signature;
pub use envelope::{EnvelopeError, Framing};
pub use keys::{KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE};
pub use passphrase::{PassphraseShare, PassphraseShareError};
pub use recipient::{
    encode_identity, encode_recipient, parse_identity, parse_recipient, Identity, Recipient,
    RecipientParseError,
};
pub use secret::{Secret, SecretError, BLAKE3_HASH_SIZE};
pub use secret_share::{SecretShare, SecretShareError};
