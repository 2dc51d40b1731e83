//! コマンドライン引数

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ClientConfig;

#[derive(Parser, Debug)]
#[command(name = "ihs-client", version, about = "In-Home Streaming session client")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter (overrides [logging].level; RUST_LOG overrides both)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to a streaming host and run one session until it ends
    Connect(ConnectArgs),
    /// Print the effective configuration as TOML
    ShowConfig(ConnectArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct ConnectArgs {
    /// Streaming host address or name
    #[arg(long)]
    pub host: Option<String>,

    /// Streaming host UDP port
    #[arg(long)]
    pub port: Option<u16>,

    /// Session key from pairing (hex)
    #[arg(long)]
    pub key: Option<String>,

    /// Steam ID sent in the authentication request
    #[arg(long)]
    pub steamid: Option<u64>,

    /// Write the raw video elementary stream to this file
    #[arg(long)]
    pub dump_video: Option<PathBuf>,
}

impl ConnectArgs {
    /// 指定された引数で設定を上書きする
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(host) = &self.host {
            config.session.host = host.clone();
        }
        if let Some(port) = self.port {
            config.session.port = port;
        }
        if let Some(key) = &self.key {
            config.session.key = key.clone();
        }
        if let Some(steamid) = self.steamid {
            config.session.steam_id = steamid;
        }
        if let Some(path) = &self.dump_video {
            config.media.dump_video = Some(path.clone());
        }
    }
}
