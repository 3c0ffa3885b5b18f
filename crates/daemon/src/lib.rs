pub mod client;
pub mod process;
pub mod service;
pub mod service_config;

// App state (configuration, credentials, paths)
pub mod state;

pub use client::{ClientError, MeshClient};
pub use process::{spawn_service, start_service, ShutdownHandle};
pub use service::{MeshService, ServiceError};
pub use service_config::{Config as ServiceConfig, ConfigError};
pub use state::{AppConfig, AppState, StateError};
