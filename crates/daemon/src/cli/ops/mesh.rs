use std::time::Duration;

use clap::Args;

use common::transport::PermissionMode;
use meshwire_daemon::ClientError;

use crate::cli::op::{OpContext, SetupError};

#[derive(Debug, thiserror::Error)]
pub enum MeshOpError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Args, Debug, Clone)]
pub struct Ask {
    /// Peer to ask
    pub peer: String,
    /// Question text
    pub text: String,

    /// Name to ask as (defaults to the configured agent name)
    #[arg(long)]
    pub from: Option<String>,

    /// Seconds to wait for the answer
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Permission mode for the receiving session
    #[arg(long, default_value = "default")]
    pub permission_mode: PermissionMode,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ask {
    type Error = MeshOpError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let client = ctx.client()?;
        let from = self
            .from
            .clone()
            .unwrap_or_else(|| client.agent_name().to_string());

        let reply = client
            .ask(
                &from,
                &self.peer,
                &self.text,
                self.timeout.map(Duration::from_secs),
                self.permission_mode,
            )
            .await?;
        Ok(reply)
    }
}

#[derive(Args, Debug, Clone)]
pub struct Notify {
    /// Peer to notify
    pub peer: String,
    /// Message text
    pub text: String,

    /// Name to send as (defaults to the configured agent name)
    #[arg(long)]
    pub from: Option<String>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Notify {
    type Error = MeshOpError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let client = ctx.client()?;
        let from = self
            .from
            .clone()
            .unwrap_or_else(|| client.agent_name().to_string());

        client.notify(&from, &self.peer, &self.text).await?;
        Ok(format!("notified {}", self.peer))
    }
}

#[derive(Args, Debug, Clone)]
pub struct Broadcast {
    /// Message text
    pub text: String,

    /// Name to send as (defaults to the configured agent name)
    #[arg(long)]
    pub from: Option<String>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Broadcast {
    type Error = MeshOpError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let client = ctx.client()?;
        let from = self
            .from
            .clone()
            .unwrap_or_else(|| client.agent_name().to_string());

        let results = client.broadcast(&from, &self.text).await?;
        let lines: Vec<String> = results
            .iter()
            .map(|(peer, failure)| match failure {
                None => format!("{}: delivered", peer),
                Some(e) => format!("{}: failed ({})", peer, e),
            })
            .collect();
        if lines.is_empty() {
            return Ok("no peers to broadcast to".to_string());
        }
        Ok(lines.join("\n"))
    }
}
