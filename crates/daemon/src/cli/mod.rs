pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Channel, Daemon, Follow, Health, Init, Publish, Resolve, Unlock, Version};
