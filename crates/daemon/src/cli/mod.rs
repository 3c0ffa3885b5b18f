pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Ask, Broadcast, Daemon, Init, Login, Notify, Peers, Sessions, Version};
