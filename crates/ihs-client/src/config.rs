//! 設定ファイル
//!
//! ```toml
//! [session]
//! host = "192.168.1.20"
//! port = 27031
//! steam_id = 76561198000000000
//! key = "00112233445566778899aabbccddeeff"
//!
//! [media]
//! audio_queue_depth = 64
//! dump_video = "capture.h264"
//!
//! [stream]
//! width = 1280
//! height = 720
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! `host` と `key` 以外はすべて既定値を持つ。

use std::path::{Path, PathBuf};
use std::time::Duration;

use ihs_crypto::SessionKey;
use ihs_session::{SessionOptions, StreamPreferences, VideoMode, DEFAULT_MTU};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// ファイルから読み込んで検証する
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ClientError::Config(format!(
                "Failed to read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// TOML 文字列から読み込む（検証はしない）
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ClientError::Config(format!("Failed to parse config: {e}")))
    }

    /// 鍵を伏せた TOML 表現
    pub fn to_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if !shown.session.key.is_empty() {
            shown.session.key = "<redacted>".into();
        }
        toml::to_string_pretty(&shown)
            .map_err(|e| ClientError::Config(format!("Failed to serialize config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        let session = &self.session;
        if session.host.trim().is_empty() {
            return Err(ClientError::InvalidConfig("session.host is required".into()));
        }
        if session.port == 0 {
            return Err(ClientError::InvalidConfig("session.port must not be 0".into()));
        }
        self.session_key()?;
        if session.recv_buffer < DEFAULT_MTU {
            return Err(ClientError::InvalidConfig(format!(
                "session.recv_buffer must be at least {DEFAULT_MTU} bytes"
            )));
        }
        if session.connect_retry_ms == 0 || session.connect_attempts == 0 {
            return Err(ClientError::InvalidConfig(
                "session.connect_retry_ms and session.connect_attempts must be positive".into(),
            ));
        }
        if self.media.audio_queue_depth == 0 || self.media.video_queue_depth == 0 {
            return Err(ClientError::InvalidConfig("media queue depths must be at least 1".into()));
        }
        let stream = &self.stream;
        if stream.width == 0 || stream.height == 0 || stream.refresh_rate_denominator == 0 {
            return Err(ClientError::InvalidConfig("stream video mode must be non-zero".into()));
        }
        Ok(())
    }

    pub fn session_key(&self) -> Result<SessionKey> {
        if self.session.key.is_empty() {
            return Err(ClientError::InvalidConfig("session.key is required".into()));
        }
        Ok(SessionKey::from_hex(&self.session.key)?)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            steam_id: self.session.steam_id,
            stream: self.stream.preferences(),
        }
    }

    /// `host:port`
    pub fn host_addr(&self) -> String {
        format!("{}:{}", self.session.host, self.session.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// ストリーミングホスト
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// ローカルのバインドアドレス
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default)]
    pub steam_id: u64,

    /// ペアリングで得たセッション鍵（16 進）
    #[serde(default)]
    pub key: String,

    /// 受信バッファ（バイト）
    #[serde(default = "default_recv_buffer")]
    pub recv_buffer: usize,

    /// CONNECT の再送間隔（ミリ秒）
    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,

    /// CONNECT を送る最大回数
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

fn default_port() -> u16 {
    27031
}
fn default_bind() -> String {
    "0.0.0.0:0".into()
}
fn default_recv_buffer() -> usize {
    2048
}
fn default_connect_retry_ms() -> u64 {
    1000
}
fn default_connect_attempts() -> u32 {
    10
}

impl SessionConfig {
    pub fn connect_retry_interval(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            bind: default_bind(),
            steam_id: 0,
            key: String::new(),
            recv_buffer: default_recv_buffer(),
            connect_retry_ms: default_connect_retry_ms(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_audio_queue_depth")]
    pub audio_queue_depth: usize,

    #[serde(default = "default_video_queue_depth")]
    pub video_queue_depth: usize,

    /// 映像ストリームの書き出し先
    #[serde(default)]
    pub dump_video: Option<PathBuf>,
}

fn default_audio_queue_depth() -> usize {
    ihs_media::DEFAULT_QUEUE_DEPTH
}
fn default_video_queue_depth() -> usize {
    256
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            audio_queue_depth: default_audio_queue_depth(),
            video_queue_depth: default_video_queue_depth(),
            dump_video: None,
        }
    }
}

/// ネゴシエーションで提示する映像モードとビットレート上限
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_refresh_rate_numerator")]
    pub refresh_rate_numerator: u32,
    #[serde(default = "default_refresh_rate_denominator")]
    pub refresh_rate_denominator: u32,
    #[serde(default = "default_max_decode_bitrate_kbps")]
    pub max_decode_bitrate_kbps: i32,
    #[serde(default = "default_max_burst_bitrate_kbps")]
    pub max_burst_bitrate_kbps: i32,
}

fn default_width() -> u32 {
    VideoMode::default().width
}
fn default_height() -> u32 {
    VideoMode::default().height
}
fn default_refresh_rate_numerator() -> u32 {
    VideoMode::default().refresh_rate_numerator
}
fn default_refresh_rate_denominator() -> u32 {
    VideoMode::default().refresh_rate_denominator
}
fn default_max_decode_bitrate_kbps() -> i32 {
    StreamPreferences::default().max_decode_bitrate_kbps
}
fn default_max_burst_bitrate_kbps() -> i32 {
    StreamPreferences::default().max_burst_bitrate_kbps
}

impl StreamConfig {
    pub fn preferences(&self) -> StreamPreferences {
        StreamPreferences {
            video_mode: VideoMode {
                width: self.width,
                height: self.height,
                refresh_rate_numerator: self.refresh_rate_numerator,
                refresh_rate_denominator: self.refresh_rate_denominator,
            },
            max_decode_bitrate_kbps: self.max_decode_bitrate_kbps,
            max_burst_bitrate_kbps: self.max_burst_bitrate_kbps,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            refresh_rate_numerator: default_refresh_rate_numerator(),
            refresh_rate_denominator: default_refresh_rate_denominator(),
            max_decode_bitrate_kbps: default_max_decode_bitrate_kbps(),
            max_burst_bitrate_kbps: default_max_burst_bitrate_kbps(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter 形式（例: "info", "ihs_session=debug"）
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

/// tracing-subscriber を初期化する
///
/// `RUST_LOG` が設定されていれば `level` より優先する。
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let subscriber = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| ClientError::Logging(e.to_string())),
        LogFormat::Text => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| ClientError::Logging(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "00112233445566778899aabbccddeeff";

    fn minimal() -> ClientConfig {
        ClientConfig::from_toml(&format!(
            "[session]\nhost = \"10.0.0.5\"\nkey = \"{KEY_HEX}\"\n"
        ))
        .unwrap()
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = minimal();
        assert_eq!(config.session.port, 27031);
        assert_eq!(config.session.bind, "0.0.0.0:0");
        assert_eq!(config.session.connect_attempts, 10);
        assert_eq!(config.media.audio_queue_depth, ihs_media::DEFAULT_QUEUE_DEPTH);
        assert_eq!(config.stream.width, 1920);
        assert_eq!(config.logging.format, LogFormat::Text);
        config.validate().unwrap();
        assert_eq!(config.host_addr(), "10.0.0.5:27031");
    }

    #[test]
    fn test_full_file() {
        let config = ClientConfig::from_toml(&format!(
            r#"
            [session]
            host = "steam-box"
            port = 27036
            steam_id = 76561198000000000
            key = "{KEY_HEX}"
            connect_retry_ms = 250

            [media]
            audio_queue_depth = 8
            dump_video = "out.h264"

            [stream]
            width = 1280
            height = 720
            max_decode_bitrate_kbps = 15000

            [logging]
            level = "ihs_session=debug"
            format = "json"
            "#
        ))
        .unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.session.connect_retry_interval(),
            Duration::from_millis(250)
        );
        assert_eq!(config.media.dump_video, Some(PathBuf::from("out.h264")));
        assert_eq!(config.logging.format, LogFormat::Json);

        let options = config.session_options();
        assert_eq!(options.steam_id, 76561198000000000);
        assert_eq!(options.stream.video_mode.width, 1280);
        assert_eq!(options.stream.video_mode.refresh_rate_numerator, 5994);
        assert_eq!(options.stream.max_decode_bitrate_kbps, 15000);
        assert_eq!(options.stream.max_burst_bitrate_kbps, 90_000);
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = minimal();
        config.session.host.clear();
        assert!(matches!(config.validate(), Err(ClientError::InvalidConfig(_))));

        let mut config = minimal();
        config.session.key = "abcd".into();
        assert!(matches!(config.validate(), Err(ClientError::Key(_))));

        let mut config = minimal();
        config.session.key.clear();
        assert!(matches!(config.validate(), Err(ClientError::InvalidConfig(_))));

        let mut config = minimal();
        config.media.audio_queue_depth = 0;
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.session.recv_buffer = 512;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            ClientConfig::from_toml("[session\nhost ="),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn test_to_toml_redacts_key() {
        let text = minimal().to_toml().unwrap();
        assert!(!text.contains(KEY_HEX));
        assert!(text.contains("<redacted>"));
        let reparsed = ClientConfig::from_toml(&text).unwrap();
        assert_eq!(reparsed.session.host, "10.0.0.5");
    }
}
