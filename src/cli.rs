use clap::Parser;

/// GitLab access-token expiry exporter
#[derive(Parser)]
#[command(name = "token-exporter", version, about)]
pub struct Cli {
    /// Port to bind (overrides SERVER_PORT)
    #[arg(short, long)]
    pub port: Option<u16>,
}
