use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wx_bridge::{Config, Daemon};

/// wxbridge - WeChat gateway bridge
#[derive(Parser)]
#[command(name = "wxbridge", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "WXBRIDGE_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Override the configured listen port
    #[arg(long, env = "WXBRIDGE_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,wx_bridge=info",
        1 => "info,wx_bridge=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.service.port = port;
    }

    Daemon::new(config).run().await?;
    Ok(())
}
