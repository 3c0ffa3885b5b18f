pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "meshwire")]
#[command(about = "Ask, notify and broadcast between coding-agent sessions")]
pub struct Args {
    /// Path to the meshwire state directory (defaults to ~/.meshwire)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
