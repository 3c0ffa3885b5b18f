use std::{fs, path::PathBuf};

use common::auth::{AuthError, Credentials, DEFAULT_SERVER_URL};
use common::peer::Peer;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "meshwire";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";
pub const PENDING_DIR_NAME: &str = "pending";
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/meshwire.sock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the cloud relay
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// How long an ask waits for its reply
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    /// Bound on connecting to the relay
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Unix socket the reply hook writes to
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Where pending-query files go (defaults to `<state dir>/pending`)
    #[serde(default)]
    pub pending_dir: Option<PathBuf>,
    /// Name used as the sender when none is given
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
    #[serde(default)]
    pub peers: Vec<Peer>,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_query_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_agent_name() -> String {
    APP_NAME.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            query_timeout_secs: default_query_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            socket_path: default_socket_path(),
            pending_dir: None,
            agent_name: default_agent_name(),
            peers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the state directory (~/.meshwire)
    pub state_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Path to the relay credentials
    pub credentials_path: PathBuf,
    /// Resolved pending-query directory
    pub pending_dir: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the state directory path (custom or default ~/.meshwire)
    pub fn state_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new state directory
    pub fn init(custom_path: Option<PathBuf>, config: Option<AppConfig>) -> Result<Self, StateError> {
        let state_dir = Self::state_dir(custom_path)?;
        let config_path = state_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&state_dir)?;

        let config = config.unwrap_or_default();
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        let state = Self::from_parts(state_dir, config);
        fs::create_dir_all(&state.pending_dir)?;
        Ok(state)
    }

    /// Load existing state from the state directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let state_dir = Self::state_dir(custom_path)?;
        if !state_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = state_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;

        Ok(Self::from_parts(state_dir, config))
    }

    fn from_parts(state_dir: PathBuf, config: AppConfig) -> Self {
        let pending_dir = config
            .pending_dir
            .clone()
            .unwrap_or_else(|| state_dir.join(PENDING_DIR_NAME));
        Self {
            config_path: state_dir.join(CONFIG_FILE_NAME),
            credentials_path: state_dir.join(CREDENTIALS_FILE_NAME),
            pending_dir,
            state_dir,
            config,
        }
    }

    /// Write the current config back to disk
    pub fn save_config(&self) -> Result<(), StateError> {
        fs::write(&self.config_path, toml::to_string_pretty(&self.config)?)?;
        Ok(())
    }

    /// Relay credentials, if this state has logged in
    pub fn load_credentials(&self) -> Result<Option<Credentials>, StateError> {
        Ok(Credentials::load(&self.credentials_path)?)
    }

    pub fn save_credentials(&self, credentials: &Credentials) -> Result<(), StateError> {
        Ok(credentials.save(&self.credentials_path)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("meshwire directory not initialized. Run 'meshwire init' first")]
    NotInitialized,

    #[error("meshwire directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("credentials error: {0}")]
    Credentials(#[from] AuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");

        let mut config = AppConfig::default();
        config.peers.push(Peer::local("backend", "main:0.1").with_path("/src/api"));
        config.peers.push(Peer::cloud("reviewer", "sess-1"));

        let state = AppState::init(Some(path.clone()), Some(config.clone())).unwrap();
        assert!(state.pending_dir.is_dir());
        assert!(matches!(
            AppState::init(Some(path.clone()), None),
            Err(StateError::AlreadyInitialized)
        ));

        let loaded = AppState::load(Some(path)).unwrap();
        assert_eq!(loaded.config, config);
        assert_eq!(loaded.pending_dir, state.pending_dir);
    }

    #[test]
    fn test_load_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
        assert!(matches!(
            AppState::load(Some(dir.path().to_path_buf())),
            Err(StateError::MissingFile(_))
        ));
    }

    #[test]
    fn test_sparse_config_gets_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            query_timeout_secs = 30

            [[peers]]
            name = "backend"
            kind = "local"
            session_handle = "main:0.1"
            "#,
        )
        .unwrap();
        assert_eq!(config.query_timeout_secs, 30);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
        assert_eq!(config.peers.len(), 1);
        assert!(config.peers[0].active);
    }

    #[test]
    fn test_credentials_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::init(Some(dir.path().join("state")), None).unwrap();
        assert!(state.load_credentials().unwrap().is_none());

        let credentials = Credentials {
            token: "token".into(),
            secret: "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8".into(),
        };
        state.save_credentials(&credentials).unwrap();
        assert_eq!(state.load_credentials().unwrap(), Some(credentials));
    }
}
