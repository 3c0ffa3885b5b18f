use std::path::PathBuf;

use clap::Args;

use meshwire_daemon::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Relay base URL
    #[arg(long)]
    pub server_url: Option<String>,

    /// Unix socket for hook replies
    #[arg(long)]
    pub socket_path: Option<PathBuf>,

    /// Name to send as when none is given
    #[arg(long)]
    pub agent_name: Option<String>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig::default();
        if let Some(url) = &self.server_url {
            config.server_url = url.clone();
        }
        if let Some(path) = &self.socket_path {
            config.socket_path = path.clone();
        }
        if let Some(name) = &self.agent_name {
            config.agent_name = name.clone();
        }

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;
        Ok(format!(
            "Initialized meshwire directory at {}",
            state.state_dir.display()
        ))
    }
}
