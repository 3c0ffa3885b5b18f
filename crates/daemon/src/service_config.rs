use std::path::PathBuf;
use std::time::Duration;

use common::peer::Peer;
use url::Url;

use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct Config {
    // relay configuration
    /// base url of the cloud relay
    pub server_url: Url,
    /// bound on establishing the relay connection
    pub connect_timeout: Duration,

    // mesh configuration
    /// default wait for an ask
    pub query_timeout: Duration,
    /// sender name when the caller gives none
    pub agent_name: String,
    /// peers registered at startup
    pub peers: Vec<Peer>,

    // local bridge configuration
    /// unix socket the reply hook writes to
    pub socket_path: PathBuf,
    /// directory for pending-query files
    pub pending_dir: PathBuf,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_state(state: &AppState) -> Result<Self, ConfigError> {
        let config = &state.config;
        let server_url = Url::parse(&config.server_url)
            .map_err(|e| ConfigError::InvalidUrl(config.server_url.clone(), e))?;
        if config.query_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("query_timeout_secs"));
        }
        if config.connect_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("connect_timeout_secs"));
        }

        Ok(Self {
            server_url,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            agent_name: config.agent_name.clone(),
            peers: config.peers.clone(),
            socket_path: config.socket_path.clone(),
            pending_dir: state.pending_dir.clone(),
            log_level: tracing::Level::INFO,
            log_dir: None,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid relay url {0:?}: {1}")]
    InvalidUrl(String, url::ParseError),
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppConfig;

    #[test]
    fn test_from_state_resolves_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::init(Some(dir.path().join("state")), None).unwrap();

        let config = Config::from_state(&state).unwrap();
        assert_eq!(config.server_url.as_str(), "https://api.cluster-fluster.com/");
        assert_eq!(config.query_timeout, Duration::from_secs(120));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.pending_dir, state.pending_dir);
        assert_eq!(config.agent_name, "meshwire");
    }

    #[test]
    fn test_from_state_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let bad_url = AppConfig {
            server_url: "not a url".into(),
            ..AppConfig::default()
        };
        let state = AppState::init(Some(dir.path().join("a")), Some(bad_url)).unwrap();
        assert!(matches!(
            Config::from_state(&state),
            Err(ConfigError::InvalidUrl(..))
        ));

        let zero = AppConfig {
            query_timeout_secs: 0,
            ..AppConfig::default()
        };
        let state = AppState::init(Some(dir.path().join("b")), Some(zero)).unwrap();
        assert!(matches!(
            Config::from_state(&state),
            Err(ConfigError::ZeroTimeout("query_timeout_secs"))
        ));
    }
}
