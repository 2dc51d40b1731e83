//! ihs-client コマンド

use clap::Parser;
use tracing::info;

use ihs_client::cli::{Cli, Commands, ConnectArgs};
use ihs_client::config::{init_logging, ClientConfig};
use ihs_client::error::Result;
use ihs_client::runner::SessionRunner;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    match cli.command {
        Commands::Connect(args) => run_connect(args, config).await,
        Commands::ShowConfig(args) => {
            args.apply(&mut config);
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn run_connect(args: ConnectArgs, mut config: ClientConfig) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;
    init_logging(&config.logging)?;

    let runner = SessionRunner::connect(&config).await?;
    let shutdown = runner.shutdown_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let summary = runner.run().await?;
    info!(
        reason = ?summary.reason,
        state = ?summary.furthest_state,
        audio_frames = summary.audio_frames,
        video_frames = summary.video_frames,
        audio_dropped = summary.audio_dropped,
        video_dropped = summary.video_dropped,
        "session ended"
    );
    Ok(())
}
