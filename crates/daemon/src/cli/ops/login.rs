use clap::Args;
use url::Url;

use common::auth::{self, AuthError, Credentials};
use common::crypto::EncryptionManager;

use meshwire_daemon::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Login {
    /// Account secret, base64url or the dashed backup form
    pub secret: String,

    /// Use this token instead of requesting one from the relay
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("invalid relay url: {0}")]
    Url(#[from] url::ParseError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Login {
    type Error = LoginError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let secret = auth::normalize_secret_key(&self.secret)?;
        let master = auth::decode_secret(&secret)?;

        let token = match &self.token {
            Some(token) => token.clone(),
            None => {
                let server_url = Url::parse(&state.config.server_url)?;
                auth::request_token(&master, &server_url).await?
            }
        };

        state.save_credentials(&Credentials { token, secret })?;
        let public_key = EncryptionManager::new(master)
            .content_keys()
            .public_key_base64();
        Ok(format!("Logged in, content public key {}", public_key))
    }
}
