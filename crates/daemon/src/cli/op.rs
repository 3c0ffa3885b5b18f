use std::error::Error;
use std::path::PathBuf;

use common::auth::Credentials;

use meshwire_daemon::state::{AppState, StateError};
use meshwire_daemon::{ConfigError, MeshClient, ServiceConfig};

#[derive(Clone, Debug)]
pub struct OpContext {
    /// Optional custom state path (defaults to ~/.meshwire)
    pub config_path: Option<PathBuf>,
}

impl OpContext {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    /// Load state, config and credentials in one go
    pub fn load(&self) -> Result<(AppState, ServiceConfig, Option<Credentials>), SetupError> {
        let state = AppState::load(self.config_path.clone())?;
        let config = ServiceConfig::from_state(&state)?;
        let credentials = state.load_credentials()?;
        Ok((state, config, credentials))
    }

    /// Client for mesh commands, forwarding to a running daemon when there is one
    pub fn client(&self) -> Result<MeshClient, SetupError> {
        let (_, config, credentials) = self.load()?;
        Ok(MeshClient::new(config, credentials))
    }
}

/// Failures shared by every command that loads the state directory
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
