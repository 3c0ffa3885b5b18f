use clap::Args;

use meshwire_daemon::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Peers;

#[async_trait::async_trait]
impl crate::cli::op::Op for Peers {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        if state.config.peers.is_empty() {
            return Ok(format!(
                "no peers configured, add [[peers]] to {}",
                state.config_path.display()
            ));
        }

        let mut peers = state.config.peers.clone();
        peers.sort_by(|a, b| a.name.cmp(&b.name));
        let lines: Vec<String> = peers
            .iter()
            .map(|peer| {
                let mut line = format!("{}\t{}\t{}", peer.name, peer.kind, peer.session_handle);
                if !peer.path.is_empty() {
                    line.push('\t');
                    line.push_str(&peer.path);
                }
                if !peer.active {
                    line.push_str("\t(inactive)");
                }
                line
            })
            .collect();
        Ok(lines.join("\n"))
    }
}
