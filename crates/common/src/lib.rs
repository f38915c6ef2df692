/**
 * Cryptographic types and operations.
 *  - Ed25519 keys and their X25519 conversion
 *  - Recipient-addressed envelopes
 */
pub mod crypto;
/**
 * Durable local state: channels, follows,
 *  peers and received messages.
 */
pub mod directory;
/**
 * Publishing chained post bundles and
 *  polling followed channels.
 */
pub mod feed;
/**
 * Keyring of historical identities plus
 *  the current recipient, and its
 *  passphrase-protected file.
 */
pub mod identity;
/**
 * Mutable names resolving to channel heads.
 */
pub mod naming;
pub mod store;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::crypto::{Identity, PublicKey, Recipient, SecretKey};
    pub use crate::directory::{Channel, DirectoryProvider, Follow, Page, Peer};
    pub use crate::feed::{FeedPublisher, FollowPoller, PostRecord, PublishRequest};
    pub use crate::identity::{IdentityCell, IdentityStore, Keyring};
    pub use crate::naming::{NameService, ResolveHint};
    pub use crate::store::BundleStore;
    pub use crate::version::build_info;
    pub use object_store::{Bundle, BundleEntry, ContentAddress, ObjectStore};
}
