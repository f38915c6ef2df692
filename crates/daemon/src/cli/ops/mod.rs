pub mod channel;
pub mod daemon;
pub mod follow;
pub mod health;
pub mod init;
pub mod publish;
pub mod resolve;
pub mod unlock;
pub mod version;

pub use channel::Channel;
pub use daemon::Daemon;
pub use follow::Follow;
pub use health::Health;
pub use init::Init;
pub use publish::Publish;
pub use resolve::Resolve;
pub use unlock::Unlock;
pub use version::Version;
