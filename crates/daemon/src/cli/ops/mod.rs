pub mod daemon;
pub mod init;
pub mod login;
pub mod mesh;
pub mod peers;
pub mod sessions;
pub mod version;

pub use daemon::Daemon;
pub use init::Init;
pub use login::Login;
pub use mesh::{Ask, Broadcast, Notify};
pub use peers::Peers;
pub use sessions::Sessions;
pub use version::Version;
