use clap::Args;

use common::transport::{Transport, TransportError};

use meshwire_daemon::service::{cloud_transport, ServiceError};

use crate::cli::op::{OpContext, SetupError};

/// List the sessions the relay knows for this account
#[derive(Args, Debug, Clone)]
pub struct Sessions {
    /// Print the decrypted metadata as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionsError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
    #[error("not logged in, run 'meshwire login' first")]
    NotLoggedIn,
    #[error("relay error: {0}")]
    Transport(#[from] TransportError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Sessions {
    type Error = SessionsError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let (_, config, credentials) = ctx.load()?;
        let credentials = credentials.ok_or(SessionsError::NotLoggedIn)?;

        let cloud = cloud_transport(&config, &credentials)?;
        let sessions = cloud.list_sessions().await;
        cloud.close().await?;
        let sessions = sessions?;

        if self.json {
            return Ok(serde_json::to_string_pretty(&sessions)?);
        }
        let lines: Vec<String> = sessions
            .iter()
            .map(|s| {
                format!(
                    "{}\t{}\t{}\t{}",
                    s.id,
                    if s.active { "active" } else { "inactive" },
                    s.host.as_deref().unwrap_or("-"),
                    s.path.as_deref().unwrap_or("-"),
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }
}
