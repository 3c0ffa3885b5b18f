use clap::Args;

use meshwire_daemon::spawn_service;

use crate::cli::op::SetupError;

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,

    /// Log at debug level
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Setup(#[from] SetupError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, mut config, credentials) = ctx.load()?;
        config.log_dir = self.log_dir.clone();
        if self.verbose {
            config.log_level = tracing::Level::DEBUG;
        }

        spawn_service(&config, credentials.as_ref()).await;
        Ok("daemon ended".to_string())
    }
}
